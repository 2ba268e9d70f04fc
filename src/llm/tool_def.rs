use serde_json::json;

use crate::llm::types::{ToolDef, ToolFunctionDef};

/// Definitions for the lookup tools exposed to the model.
pub fn default_tools_def() -> Vec<ToolDef> {
    vec![
        ToolDef {
            kind: "function".into(),
            function: ToolFunctionDef {
                name: "web_search".into(),
                description: "Searches the web and returns a short list of results, each with a title, URL, and snippet. Use this for current events, practical questions, or anything where an encyclopedia entry is unlikely to exist. The query should be a few focused keywords rather than a full sentence.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query."
                        },
                        "max_results": {
                            "type": "integer",
                            "description": "Maximum number of results to return (default 5)."
                        }
                    },
                    "required": ["query"]
                }),
            },
        },
        ToolDef {
            kind: "function".into(),
            function: ToolFunctionDef {
                name: "wikipedia".into(),
                description: "Looks up a topic on Wikipedia and returns the title, an introductory plain-text extract, and the canonical URL of the best-matching article. Use this for encyclopedic topics: people, places, organizations, concepts, historical events.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The topic to look up."
                        },
                        "sentences": {
                            "type": "integer",
                            "description": "How many sentences of the extract to return (default 5)."
                        }
                    },
                    "required": ["query"]
                }),
            },
        },
    ]
}
