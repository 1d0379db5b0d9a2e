//! Static tool catalog: schemas presented to the model and argument validation

use super::base::{ToolName, ToolRequest};
use crate::error::ToolError;
use crate::llm::{FunctionDefinition, ToolDefinition};
use crate::sandbox::CodeLanguage;
use serde_json::{json, Map, Value};

/// One declared parameter; every parameter in the catalog is a string
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<&'static str>,
    pub allowed: Option<&'static [&'static str]>,
}

const fn required(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        description,
        required: true,
        default: None,
        allowed: None,
    }
}

const fn optional(
    name: &'static str,
    description: &'static str,
    default: &'static str,
) -> ParamSpec {
    ParamSpec {
        name,
        description,
        required: false,
        default: Some(default),
        allowed: None,
    }
}

const LANGUAGES: &[&str] = &["python", "java", "javascript", "go", "bash", "typescript"];

impl ToolName {
    pub fn description(&self) -> &'static str {
        match self {
            ToolName::ExecuteCommand => {
                "Execute a shell command in the sandbox. Useful for running system commands, \
                 checking system status, or executing scripts."
            }
            ToolName::ReadFile => "Read the contents of a file in the sandbox.",
            ToolName::WriteFile => {
                "Write content to a file in the sandbox. Creates the file if it doesn't exist, \
                 overwrites if it does."
            }
            ToolName::ListFiles => {
                "List files in a directory in the sandbox. Useful for exploring the filesystem."
            }
            ToolName::RunCode => {
                "Execute code in the sandbox's code interpreter. Supports Python, Java, \
                 JavaScript, Go, Bash, and TypeScript."
            }
        }
    }

    pub fn params(&self) -> &'static [ParamSpec] {
        const EXECUTE_COMMAND: &[ParamSpec] = &[required(
            "command",
            "The shell command to execute. For example: 'ls -la', 'cat file.txt', 'python script.py'",
        )];
        const READ_FILE: &[ParamSpec] = &[required(
            "path",
            "The file path to read. For example: '/tmp/test.txt', './script.py'",
        )];
        const WRITE_FILE: &[ParamSpec] = &[
            required(
                "path",
                "The file path to write. For example: '/tmp/test.txt', './script.py'",
            ),
            required("content", "The content to write to the file."),
        ];
        const LIST_FILES: &[ParamSpec] = &[
            optional(
                "path",
                "The directory path to list. Defaults to the current directory.",
                ".",
            ),
            optional(
                "pattern",
                "Glob pattern to filter files. For example: '*.py', 'test_*.txt'. Defaults to '*'.",
                "*",
            ),
        ];
        const RUN_CODE: &[ParamSpec] = &[
            required("code", "The code to execute. Can be multi-line code."),
            ParamSpec {
                name: "language",
                description: "The programming language of the code. Defaults to python.",
                required: false,
                default: Some("python"),
                allowed: Some(LANGUAGES),
            },
        ];

        match self {
            ToolName::ExecuteCommand => EXECUTE_COMMAND,
            ToolName::ReadFile => READ_FILE,
            ToolName::WriteFile => WRITE_FILE,
            ToolName::ListFiles => LIST_FILES,
            ToolName::RunCode => RUN_CODE,
        }
    }

    /// JSON schema of the parameters object
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in self.params() {
            let mut prop = json!({
                "type": "string",
                "description": param.description,
            });
            if let Some(allowed) = param.allowed {
                prop["enum"] = json!(allowed);
            }
            if let Some(default) = param.default {
                prop["default"] = json!(default);
            }
            properties.insert(param.name.to_string(), prop);
        }
        let required: Vec<&str> = self
            .params()
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: self.as_str().to_string(),
                description: self.description().to_string(),
                parameters: self.parameters_schema(),
            },
        }
    }
}

/// The catalog sent to the model every turn, in fixed order
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ToolName::ALL.iter().map(ToolName::definition).collect()
}

fn available_tools() -> String {
    ToolName::ALL
        .iter()
        .map(ToolName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate a raw invocation against the catalog
///
/// Unknown names yield `unknown_tool`; a missing required argument, a
/// non-string value or an empty command/path/code yields `invalid_arguments`.
/// Undeclared arguments are ignored.
pub fn parse_request(name: &str, arguments: &Value) -> Result<ToolRequest, ToolError> {
    let tool = ToolName::from_name(name).ok_or_else(|| ToolError::UnknownTool {
        name: name.to_string(),
        available: available_tools(),
    })?;

    let empty = Map::new();
    let args = match arguments {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(invalid(
                tool,
                format!("arguments must be a JSON object, got {}", describe(other)),
            ))
        }
    };

    let args = ArgReader { tool, args };
    let request = match tool {
        ToolName::ExecuteCommand => ToolRequest::ExecuteCommand {
            command: args.non_empty("command")?,
        },
        ToolName::ReadFile => ToolRequest::ReadFile {
            path: args.non_empty("path")?,
        },
        ToolName::WriteFile => ToolRequest::WriteFile {
            path: args.non_empty("path")?,
            content: args.string("content")?,
        },
        ToolName::ListFiles => ToolRequest::ListFiles {
            path: args.string("path")?,
            pattern: args.string("pattern")?,
        },
        ToolName::RunCode => {
            let language = args.string("language")?;
            ToolRequest::RunCode {
                code: args.non_empty("code")?,
                language: CodeLanguage::parse(&language).ok_or_else(|| {
                    invalid(
                        tool,
                        format!(
                            "unsupported language '{}', expected one of {}",
                            language,
                            LANGUAGES.join(", ")
                        ),
                    )
                })?,
            }
        }
    };
    Ok(request)
}

fn invalid(tool: ToolName, message: String) -> ToolError {
    ToolError::InvalidArguments {
        tool: tool.as_str().to_string(),
        message,
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

struct ArgReader<'a> {
    tool: ToolName,
    args: &'a Map<String, Value>,
}

impl ArgReader<'_> {
    fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.tool.params().iter().find(|p| p.name == name)
    }

    /// Declared string argument, falling back to its default when optional
    fn string(&self, name: &str) -> Result<String, ToolError> {
        let default = self.param(name).and_then(|p| p.default);
        match (self.args.get(name), default) {
            (Some(Value::String(value)), _) => Ok(value.clone()),
            (None | Some(Value::Null), Some(default)) => Ok(default.to_string()),
            (None | Some(Value::Null), None) => Err(invalid(
                self.tool,
                format!("missing required parameter '{}'", name),
            )),
            (Some(other), _) => Err(invalid(
                self.tool,
                format!("parameter '{}' must be a string, got {}", name, describe(other)),
            )),
        }
    }

    fn non_empty(&self, name: &str) -> Result<String, ToolError> {
        let value = self.string(name)?;
        if value.trim().is_empty() {
            return Err(invalid(
                self.tool,
                format!("parameter '{}' must not be empty", name),
            ));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_five_tools_in_order() {
        let defs = tool_definitions();
        let names: Vec<_> = defs.iter().map(|d| d.function.name.as_str()).collect();
        assert_eq!(
            names,
            ["execute_command", "read_file", "write_file", "list_files", "run_code"]
        );
        assert!(defs.iter().all(|d| d.tool_type == "function"));
    }

    #[test]
    fn test_schema_shape() {
        let schema = ToolName::RunCode.parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["code"]));
        assert_eq!(schema["properties"]["language"]["enum"].as_array().unwrap().len(), 6);

        let schema = ToolName::ListFiles.parameters_schema();
        assert_eq!(schema["required"], json!([]));
        assert_eq!(schema["properties"]["pattern"]["default"], "*");
    }

    #[test]
    fn test_unknown_tool() {
        let err = parse_request("delete_universe", &json!({})).unwrap_err();
        assert_eq!(err.kind(), "unknown_tool");
        assert!(err.to_string().contains("delete_universe"));
    }

    #[test]
    fn test_missing_and_mistyped_arguments() {
        let err = parse_request("read_file", &json!({})).unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");

        let err = parse_request("read_file", &json!({"path": 42})).unwrap_err();
        assert!(err.to_string().contains("must be a string"));

        let err = parse_request("execute_command", &json!({"command": "  "})).unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");

        let err = parse_request("write_file", &json!("{broken")).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn test_defaults_and_extras() {
        let request = parse_request("list_files", &Value::Null).unwrap();
        assert_eq!(
            request,
            ToolRequest::ListFiles {
                path: ".".into(),
                pattern: "*".into()
            }
        );

        let request =
            parse_request("read_file", &json!({"path": "/tmp/a.txt", "encoding": "utf8"})).unwrap();
        assert_eq!(
            request,
            ToolRequest::ReadFile {
                path: "/tmp/a.txt".into()
            }
        );

        let request = parse_request("write_file", &json!({"path": "/tmp/e", "content": ""}));
        assert!(request.is_ok());
    }

    #[test]
    fn test_run_code_language() {
        let request = parse_request("run_code", &json!({"code": "print(1)"})).unwrap();
        assert_eq!(
            request,
            ToolRequest::RunCode {
                code: "print(1)".into(),
                language: CodeLanguage::Python
            }
        );

        let request =
            parse_request("run_code", &json!({"code": "echo hi", "language": "Bash"})).unwrap();
        assert_eq!(request.tool(), ToolName::RunCode);

        let err = parse_request("run_code", &json!({"code": "x", "language": "cobol"})).unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
    }
}
