//! Wire shapes for network interception.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// HTTP header as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
	pub name: String,
	pub value: String,
}

impl HeaderEntry {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
		}
	}
}

/// Synthetic response used to fulfill an intercepted request.
#[derive(Debug, Clone, Default)]
pub struct FulfillOptions {
	pub status: Option<u16>,
	pub headers: Vec<HeaderEntry>,
	pub content_type: Option<String>,
	pub body: Option<Vec<u8>>,
}

impl FulfillOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn status(mut self, status: u16) -> Self {
		self.status = Some(status);
		self
	}

	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push(HeaderEntry::new(name, value));
		self
	}

	pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());
		self
	}

	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());
		self
	}

	/// Builds the `fulfill` parameter object. The body always travels base64-encoded.
	pub fn to_params(&self) -> FulfillParams {
		let mut headers = self.headers.clone();
		if let Some(content_type) = &self.content_type {
			headers.retain(|h| !h.name.eq_ignore_ascii_case("content-type"));
			headers.push(HeaderEntry::new("content-type", content_type.clone()));
		}
		FulfillParams {
			status: self.status.unwrap_or(200),
			headers,
			body: self
				.body
				.as_deref()
				.map(|b| STANDARD.encode(b))
				.unwrap_or_default(),
			is_base64: true,
		}
	}
}

/// `Route.fulfill` parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillParams {
	pub status: u16,
	pub headers: Vec<HeaderEntry>,
	pub body: String,
	pub is_base64: bool,
}

/// Request modifications applied when continuing an intercepted request.
#[derive(Debug, Clone, Default)]
pub struct ContinueOverrides {
	pub url: Option<String>,
	pub method: Option<String>,
	pub headers: Option<Vec<HeaderEntry>>,
	pub post_data: Option<Vec<u8>>,
}

impl ContinueOverrides {
	/// Builds the `continue` parameter object.
	pub fn to_params(&self, is_fallback: bool) -> ContinueParams {
		ContinueParams {
			url: self.url.clone(),
			method: self.method.clone(),
			headers: self.headers.clone(),
			post_data: self.post_data.as_deref().map(|b| STANDARD.encode(b)),
			is_fallback,
		}
	}
}

/// `Route.continue` parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueParams {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub headers: Option<Vec<HeaderEntry>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub post_data: Option<String>,
	pub is_fallback: bool,
}

/// `Route.abort` parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortParams {
	pub error_code: String,
}

/// One entry of `setNetworkInterceptionPatterns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptionPattern {
	pub glob: String,
}

/// `setNetworkInterceptionPatterns` parameters. An empty list disables interception.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterceptionPatterns {
	pub patterns: Vec<InterceptionPattern>,
}
