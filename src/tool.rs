use crate::{dataset::TableSource, filter::SearchOutcome, oracle::SEARCH_TOOL_NAME};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    schemars,
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Search arguments as advertised to MCP clients. Values are kept untyped so
/// that quoted numbers and blanks reach the sanitizer instead of failing
/// deserialization.
#[derive(Debug, Default, serde::Deserialize, schemars::JsonSchema)]
pub struct SearchCompaniesRequest {
    /// The legal form of the company, e.g. Aktiebolag.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub company_type: Option<Value>,
    /// A legal form to leave out of the results.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub exclude_company_type: Option<Value>,
    /// The minimum number of employees.
    #[serde(default)]
    #[schemars(with = "Option<i64>")]
    pub min_employees: Option<Value>,
    /// The maximum number of employees.
    #[serde(default)]
    #[schemars(with = "Option<i64>")]
    pub max_employees: Option<Value>,
    /// The minimum turnover value.
    #[serde(default)]
    #[schemars(with = "Option<i64>")]
    pub min_turnover: Option<Value>,
    /// The maximum turnover value.
    #[serde(default)]
    #[schemars(with = "Option<i64>")]
    pub max_turnover: Option<Value>,
    /// A location like a city, municipality or county.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub geography: Option<Value>,
    /// An SNI industry code or prefix.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub sni_code: Option<Value>,
}

impl SearchCompaniesRequest {
    pub fn into_arguments(self) -> Map<String, Value> {
        [
            ("company_type", self.company_type),
            ("exclude_company_type", self.exclude_company_type),
            ("min_employees", self.min_employees),
            ("max_employees", self.max_employees),
            ("min_turnover", self.min_turnover),
            ("max_turnover", self.max_turnover),
            ("geography", self.geography),
            ("sni_code", self.sni_code),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name.to_string(), value)))
        .collect()
    }
}

#[derive(Clone)]
pub struct CompanySearchTool {
    source: Arc<dyn TableSource>,
    tool_router: ToolRouter<CompanySearchTool>,
}

#[tool_router]
impl CompanySearchTool {
    pub fn new(source: Arc<dyn TableSource>) -> Self {
        Self {
            source,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "search_companies",
        description = "Searches and filters a database of Swedish companies. Returns at most 10 companies as a JSON array, or [{\"error\": ...}] when the data is unavailable.",
        annotations(title = "Swedish companies", read_only_hint = true)
    )]
    pub async fn search_companies(
        &self,
        Parameters(request): Parameters<SearchCompaniesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let raw = request.into_arguments();
        tracing::info!(tool = SEARCH_TOOL_NAME, arguments = ?raw, "mcp tool call");

        let outcome = SearchOutcome::from_arguments(self.source.as_ref(), &raw);
        Ok(CallToolResult::success(vec![Content::text(outcome.to_wire())]))
    }
}

#[tool_handler]
impl ServerHandler for CompanySearchTool {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "This server searches a register of Swedish companies by legal form, size, turnover, location and SNI code.".to_string(),
            ),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        if let Some(http_request_part) = context.extensions.get::<axum::http::request::Parts>() {
            let initialize_headers = &http_request_part.headers;
            let initialize_uri = &http_request_part.uri;
            tracing::info!(?initialize_headers, %initialize_uri, "initialize from http server");
        }
        Ok(self.get_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use serde_json::json;

    fn tool() -> CompanySearchTool {
        let table = Table::new(
            vec!["Company name".into(), "2024- Employees".into()],
            vec![
                vec![Some("Small AB".into()), Some("3".into())],
                vec![Some("Large AB".into()), Some("300".into())],
            ],
        );
        CompanySearchTool::new(Arc::new(table))
    }

    fn request(value: Value) -> SearchCompaniesRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_request_accepts_sloppy_values() {
        let request = request(json!({
            "min_employees": "",
            "max_employees": "5",
            "geography": null,
            "sort": "name",
        }));
        let raw = request.into_arguments();
        assert_eq!(raw.get("min_employees"), Some(&json!("")));
        assert_eq!(raw.get("max_employees"), Some(&json!("5")));
        assert!(!raw.contains_key("geography"));
        assert!(!raw.contains_key("sort"));
    }

    #[test]
    fn test_request_schema_lists_every_field() {
        let schema = serde_json::to_value(schemars::schema_for!(SearchCompaniesRequest)).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert_eq!(properties.len(), 8);
        assert!(properties.contains_key("exclude_company_type"));
        assert!(
            schema
                .get("required")
                .and_then(Value::as_array)
                .is_none_or(|required| required.is_empty())
        );
    }

    #[tokio::test]
    async fn test_search_companies_tool() {
        let result = tool()
            .search_companies(Parameters(request(json!({"min_employees": 100}))))
            .await
            .unwrap();

        let result = serde_json::to_value(&result).unwrap();
        let payload: Value =
            serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(payload, json!([{"Company name": "Large AB", "2024- Employees": 300}]));
    }
}
