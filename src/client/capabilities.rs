//! Service extensions advertised in an EHLO response.

use std::collections::HashMap;

use super::response::Response;

/// The keywords (and their parameters) a server listed after `EHLO`.
///
/// The first EHLO line is the server greeting and is not an extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    extensions: HashMap<String, String>,
}

impl Capabilities {
    #[must_use]
    pub fn from_ehlo(response: &Response) -> Self {
        let mut extensions = HashMap::new();

        for line in response.lines.iter().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // Some servers still use the pre-RFC 4954 `AUTH=PLAIN LOGIN` form
            let (keyword, params) = line
                .split_once([' ', '='])
                .map_or((line, ""), |(keyword, params)| (keyword, params.trim()));
            let keyword = keyword.to_ascii_uppercase();

            extensions
                .entry(keyword)
                .and_modify(|existing: &mut String| {
                    if !params.is_empty() {
                        if !existing.is_empty() {
                            existing.push(' ');
                        }
                        existing.push_str(params);
                    }
                })
                .or_insert_with(|| params.to_string());
        }

        Self { extensions }
    }

    /// Returns `true` if `keyword` was advertised (case-insensitive).
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.extensions.contains_key(&keyword.to_ascii_uppercase())
    }

    #[must_use]
    pub fn starttls(&self) -> bool {
        self.supports("STARTTLS")
    }

    /// The SASL mechanisms listed under `AUTH`, upper-cased.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.extensions
            .get("AUTH")
            .map(|mechanisms| {
                mechanisms
                    .split_ascii_whitespace()
                    .map(str::to_ascii_uppercase)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The `SIZE` limit, if the extension was advertised. `Some(0)` means no fixed limit.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        self.extensions
            .get("SIZE")
            .map(|limit| limit.parse().unwrap_or(0))
    }
}
