//! Implements the `Sheet` trait using the `sheets::Client` to interact with a Google sheet.

use crate::api::{Sheet, SheetRange, SharedTokenProvider};
use crate::{Config, Result};
use anyhow::Context;
use sheets::types::{
    BatchUpdateSpreadsheetRequest, BatchUpdateValuesRequest, DateTimeRenderOption, Dimension,
    ValueInputOption, ValueRange, ValueRenderOption,
};
use sheets::ClientError;
use tracing::trace;

/// Implements the `Sheet` trait with the Google Sheets API. A fresh `sheets::Client` is built for
/// each call from the shared `TokenProvider`, which refreshes the access token when needed.
pub struct GoogleSheet {
    config: Config,
    token_provider: SharedTokenProvider,
}

impl GoogleSheet {
    pub fn new(config: Config, token_provider: SharedTokenProvider) -> Self {
        Self {
            config,
            token_provider,
        }
    }

    async fn client(&self) -> Result<sheets::Client> {
        let access_token = self.token_provider.lock().await.token_with_refresh().await?;

        // The sheets crate wants the OAuth client details, but API calls only need the access
        // token. Refreshing is handled by the `TokenProvider`.
        Ok(sheets::Client::new(
            String::new(),
            String::new(),
            String::new(),
            access_token,
            String::new(),
        ))
    }
}

#[async_trait::async_trait]
impl Sheet for GoogleSheet {
    async fn get(&mut self, range: &str) -> Result<Vec<Vec<String>>> {
        trace!("get for {range}");
        let response = self
            .client()
            .await?
            .spreadsheets()
            .values_get(
                self.config.spreadsheet_id(),
                range,
                DateTimeRenderOption::FormattedString,
                Dimension::Rows,
                ValueRenderOption::FormattedValue,
            )
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to fetch '{range}'"))?;
        Ok(response.body.values)
    }

    async fn add_sheet(&mut self, title: &str) -> Result<()> {
        trace!("add_sheet for {title}");
        // The generated request types have no `Default`; every field is optional on the wire.
        let request: BatchUpdateSpreadsheetRequest = serde_json::from_value(serde_json::json!({
            "requests": [{ "addSheet": { "properties": { "title": title } } }]
        }))
        .context("Unable to build the request to add a tab")?;
        self.client()
            .await?
            .spreadsheets()
            .batch_update(self.config.spreadsheet_id(), &request)
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to add the '{title}' tab"))?;
        Ok(())
    }

    async fn write_ranges(&mut self, data: &[SheetRange]) -> Result<()> {
        let value_ranges: Vec<ValueRange> = data
            .iter()
            .map(|sr| ValueRange {
                major_dimension: Some(Dimension::Rows),
                range: sr.range.clone(),
                values: sr.values.clone(),
            })
            .collect();

        let request = BatchUpdateValuesRequest {
            data: value_ranges,
            include_values_in_response: Some(false),
            response_date_time_render_option: None,
            response_value_render_option: None,
            value_input_option: Some(ValueInputOption::UserEntered),
        };

        self.client()
            .await?
            .spreadsheets()
            .values_batch_update(self.config.spreadsheet_id(), &request)
            .await
            .map_err(map_client_error)
            .context("Failed to write ranges")?;
        Ok(())
    }
}

/// Names the `ClientError` variant and keeps the error itself in the chain. Google's message, such
/// as "Unable to parse range", is part of the `HttpError` display.
fn map_client_error(e: ClientError) -> anyhow::Error {
    let name = match &e {
        ClientError::EmptyRefreshToken => "EmptyRefreshToken".to_string(),
        ClientError::FromUtf8Error(inner) => format!("FromUtf8Error {inner}"),
        ClientError::UrlParserError(inner) => format!("UrlParserError {inner}"),
        ClientError::SerdeJsonError(inner) => format!("SerdeJsonError {inner}"),
        ClientError::ReqwestError(inner) => format!("ReqwestError {inner}"),
        ClientError::InvalidHeaderValue(inner) => format!("InvalidHeaderValue {inner}"),
        ClientError::ReqwestMiddleWareError(inner) => format!("ReqwestMiddleWareError {inner}"),
        ClientError::HttpError { .. } => "HttpError".to_string(),
        ClientError::Other(_) => "Other".to_string(),
    };
    anyhow::Error::new(e).context(name)
}
