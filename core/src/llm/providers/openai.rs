//! OpenAI-compatible client implementation using async-openai library

use crate::config::ResolvedLlmConfig;
use crate::error::{LlmError, Result};
use crate::llm::{
    ChatOptions, FinishReason, LlmClient, LlmResponse, Message, MessageRole, ToolDefinition, Usage,
};
use crate::tools::ToolCall;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
        ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessage,
        ChatCompletionRequestToolMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, FunctionCall, FunctionObject, Stop,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;

/// OpenAI client using async-openai library
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    /// Create a new OpenAI client from resolved LLM config
    pub fn new(config: &ResolvedLlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(LlmError::Authentication {
                message: "No API key found for OpenAI-compatible endpoint".to_string(),
            }
            .into());
        }

        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        let base_url = config.base_url.trim_end_matches('/');
        if base_url != "https://api.openai.com/v1" {
            openai_config = openai_config.with_api_base(base_url);
        }

        Ok(Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
        })
    }

    /// Convert transcript messages to async-openai format
    fn convert_messages(
        messages: Vec<Message>,
        system_prompt: Option<String>,
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut converted = Vec::with_capacity(messages.len() + 1);

        if let Some(prompt) = system_prompt {
            converted.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: prompt.into(),
                    name: None,
                },
            ));
        }

        for message in messages {
            match message.role {
                MessageRole::User => {
                    converted.push(ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessage {
                            content: message.content.into(),
                            name: None,
                        },
                    ));
                }
                MessageRole::Assistant => {
                    let tool_calls: Vec<ChatCompletionMessageToolCall> = message
                        .tool_calls
                        .iter()
                        .map(|call| ChatCompletionMessageToolCall {
                            id: call.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: call.name.clone(),
                                arguments: encode_arguments(&call.arguments),
                            },
                        })
                        .collect();

                    converted.push(ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessage {
                            content: if message.content.is_empty() {
                                None
                            } else {
                                Some(ChatCompletionRequestAssistantMessageContent::Text(
                                    message.content,
                                ))
                            },
                            name: None,
                            tool_calls: if tool_calls.is_empty() {
                                None
                            } else {
                                Some(tool_calls)
                            },
                            audio: None,
                            refusal: None,
                            ..Default::default()
                        },
                    ));
                }
                MessageRole::Tool => {
                    let tool_call_id =
                        message
                            .tool_call_id
                            .ok_or_else(|| LlmError::InvalidRequest {
                                message: "Tool message must carry a tool_call_id".to_string(),
                            })?;
                    converted.push(ChatCompletionRequestMessage::Tool(
                        ChatCompletionRequestToolMessage {
                            content: ChatCompletionRequestToolMessageContent::Text(
                                message.content,
                            ),
                            tool_call_id,
                        },
                    ));
                }
            }
        }

        Ok(converted)
    }

    /// Convert tool definitions to async-openai format
    fn convert_tools(tools: Vec<ToolDefinition>) -> Vec<ChatCompletionTool> {
        tools
            .into_iter()
            .map(|tool| ChatCompletionTool {
                r#type: ChatCompletionToolType::Function,
                function: FunctionObject {
                    name: tool.function.name,
                    description: Some(tool.function.description),
                    parameters: Some(tool.function.parameters),
                    strict: None,
                },
            })
            .collect()
    }

    /// Convert async-openai response to our internal format
    fn convert_response(response: CreateChatCompletionResponse) -> Result<LlmResponse> {
        let choice =
            response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| LlmError::InvalidResponse {
                    message: "No choices in response".to_string(),
                })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tool_call| {
                ToolCall::with_id(
                    tool_call.id,
                    tool_call.function.name,
                    decode_arguments(&tool_call.function.arguments),
                )
            })
            .collect::<Vec<_>>();

        let usage = response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        let finish_reason = choice.finish_reason.map(|reason| match reason {
            async_openai::types::FinishReason::Stop => FinishReason::Stop,
            async_openai::types::FinishReason::Length => FinishReason::Length,
            async_openai::types::FinishReason::ToolCalls => FinishReason::ToolCalls,
            async_openai::types::FinishReason::ContentFilter => FinishReason::ContentFilter,
            async_openai::types::FinishReason::FunctionCall => FinishReason::ToolCalls,
        });

        Ok(LlmResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason,
            usage,
            model: response.model,
        })
    }
}

/// Arguments are sent back as the JSON text the model produced
fn encode_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

/// Unparseable argument text is kept verbatim so validation can reject it
fn decode_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn map_openai_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) => LlmError::Network {
            message: e.to_string(),
        },
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.clone().unwrap_or_default();
            let code = api
                .code
                .clone()
                .map(|c| c.to_string())
                .unwrap_or_default();
            if kind.contains("auth") || code.contains("invalid_api_key") {
                LlmError::Authentication {
                    message: api.message,
                }
            } else if code.contains("rate_limit") || kind.contains("rate_limit") {
                LlmError::RateLimit {
                    message: api.message,
                }
            } else {
                LlmError::ApiError {
                    status: 500,
                    message: api.message,
                }
            }
        }
        OpenAIError::JSONDeserialize(e) => LlmError::InvalidResponse {
            message: e.to_string(),
        },
        other => LlmError::ApiError {
            status: 500,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat_completion(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
        options: Option<ChatOptions>,
    ) -> Result<LlmResponse> {
        let options = options.unwrap_or_default();
        let converted_messages = Self::convert_messages(messages, options.system_prompt.clone())?;
        let converted_tools = tools.map(Self::convert_tools);

        if let Some(ref tools) = converted_tools {
            tracing::debug!("OpenAI request with {} tools enabled", tools.len());
        }

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder.model(&self.model);
        request_builder.messages(converted_messages);

        if let Some(tools) = converted_tools {
            request_builder.tools(tools);
        }
        if let Some(max_tokens) = options.max_tokens {
            request_builder.max_tokens(max_tokens);
        }
        if let Some(temperature) = options.temperature {
            request_builder.temperature(temperature);
        }
        if let Some(top_p) = options.top_p {
            request_builder.top_p(top_p);
        }
        if let Some(stop) = options.stop {
            request_builder.stop(Stop::StringArray(stop));
        }

        let request = request_builder.build().map_err(|e| {
            tracing::error!("Failed to build OpenAI request: {}", e);
            LlmError::InvalidRequest {
                message: format!("Failed to build request: {}", e),
            }
        })?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            tracing::error!("OpenAI API call failed: {}", e);
            map_openai_error(e)
        })?;

        let response = Self::convert_response(response)?;
        for call in &response.tool_calls {
            tracing::debug!("Tool call: {} (id: {})", call.name, call.id);
        }
        Ok(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use serde_json::json;

    #[test]
    fn test_missing_api_key_is_rejected() {
        let config = ResolvedLlmConfig::new(
            Protocol::OpenAICompat,
            "https://api.openai.com/v1".into(),
            String::new(),
            "gpt-4o".into(),
        );
        assert!(OpenAiClient::new(&config).is_err());
    }

    #[test]
    fn test_convert_messages_keeps_tool_correlation() {
        let call = ToolCall::with_id("call_1", "list_files", json!({"path": "/tmp"}));
        let messages = vec![
            Message::user("list /tmp"),
            Message::assistant_with_tools("", vec![call]),
            Message::tool("call_1", "list_files", "/tmp/a.txt"),
        ];

        let converted =
            OpenAiClient::convert_messages(messages, Some("be brief".into())).unwrap();
        assert_eq!(converted.len(), 4);
        assert!(matches!(converted[0], ChatCompletionRequestMessage::System(_)));
        match &converted[2] {
            ChatCompletionRequestMessage::Assistant(msg) => {
                let calls = msg.tool_calls.as_ref().unwrap();
                assert_eq!(calls[0].id, "call_1");
                assert_eq!(calls[0].function.arguments, r#"{"path":"/tmp"}"#);
                assert!(msg.content.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
        match &converted[3] {
            ChatCompletionRequestMessage::Tool(msg) => assert_eq!(msg.tool_call_id, "call_1"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_tool_message_without_id_is_invalid() {
        let mut orphan = Message::tool("x", "read_file", "data");
        orphan.tool_call_id = None;
        assert!(OpenAiClient::convert_messages(vec![orphan], None).is_err());
    }

    #[test]
    fn test_decode_arguments() {
        assert_eq!(decode_arguments(r#"{"path":"/tmp"}"#), json!({"path": "/tmp"}));
        assert_eq!(decode_arguments(""), json!({}));
        assert_eq!(decode_arguments("{not json"), json!("{not json"));
    }
}
