//! Content extraction - rendered markup to structured records.
//!
//! Extraction is pure and deterministic: the same markup with the same
//! spec always yields byte-identical record content. Selector specs are
//! declarative lists evaluated uniformly; there is no per-field logic.

mod markup;

use serde::{Deserialize, Serialize};

use crate::browser::session::WaitCondition;
use crate::error::{ExtractError, ExtractResult};
use crate::types::record::{ExtractedField, ExtractionRecord};

/// Body selectors tried, in order, when a spec names none.
///
/// Mirrors where real pages keep their primary copy; `body` is the
/// catch-all.
pub const DEFAULT_BODY_SELECTORS: [&str; 5] =
    ["main", "article", ".content", ".main-content", "body"];

/// One declarative field rule: name, selector, required flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    pub selector: String,
    #[serde(default)]
    pub required: bool,
}

impl FieldRule {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            required: false,
        }
    }

    /// Mark the field required; extraction fails when it is absent.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Declarative selector spec for one target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionSpec {
    /// Title selector; falls back to `title` then `h1`.
    pub title_selector: Option<String>,

    /// Body selector candidates, first match wins. Empty means the
    /// default chain applies.
    #[serde(default)]
    pub body_selectors: Vec<String>,

    /// Field rules evaluated in order.
    #[serde(default)]
    pub fields: Vec<FieldRule>,

    /// Readiness condition navigation waits for before markup is read.
    #[serde(default)]
    pub wait: WaitCondition,
}

impl ExtractionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title_selector(mut self, selector: impl Into<String>) -> Self {
        self.title_selector = Some(selector.into());
        self
    }

    /// Add a body selector candidate.
    pub fn with_body_selector(mut self, selector: impl Into<String>) -> Self {
        self.body_selectors.push(selector.into());
        self
    }

    /// Add a field rule.
    pub fn with_field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    /// Set the navigation wait condition.
    pub fn with_wait(mut self, wait: WaitCondition) -> Self {
        self.wait = wait;
        self
    }

    fn body_candidates(&self) -> Vec<&str> {
        if self.body_selectors.is_empty() {
            DEFAULT_BODY_SELECTORS.to_vec()
        } else {
            self.body_selectors.iter().map(String::as_str).collect()
        }
    }
}

/// Convert raw markup into an extraction record.
///
/// Fails with [`ExtractError::EmptyContent`] when no body selector yields
/// text, and [`ExtractError::MissingField`] when a required field is
/// absent. Both are content errors and are never retried.
pub fn extract(
    source_url: &str,
    raw_markup: &str,
    spec: &ExtractionSpec,
) -> ExtractResult<ExtractionRecord> {
    let clean = markup::strip_noise(raw_markup);

    let title = extract_title(&clean, spec);

    let body = spec
        .body_candidates()
        .iter()
        .find_map(|selector| {
            markup::select_first(&clean, selector)
                .map(|inner| markup::block_text(&inner))
                .filter(|text| !text.trim().is_empty())
        })
        .ok_or(ExtractError::EmptyContent)?;

    let mut fields = Vec::with_capacity(spec.fields.len());
    for rule in &spec.fields {
        let value = markup::select_first(&clean, &rule.selector)
            .map(|inner| markup::flatten_text(&inner))
            .filter(|text| !text.is_empty());

        match value {
            Some(value) => fields.push(ExtractedField::new(&rule.name, value)),
            None if rule.required => {
                return Err(ExtractError::MissingField {
                    field: rule.name.clone(),
                })
            }
            None => {}
        }
    }

    Ok(ExtractionRecord::new(source_url, title, body, fields))
}

fn extract_title(clean: &str, spec: &ExtractionSpec) -> String {
    let from_selector = |selector: &str| {
        markup::select_first(clean, selector)
            .map(|inner| markup::flatten_text(&inner))
            .filter(|text| !text.is_empty())
    };

    if let Some(selector) = &spec.title_selector {
        if let Some(title) = from_selector(selector) {
            return title;
        }
    }
    from_selector("title")
        .or_else(|| from_selector("h1"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head><title>Acme Corp - Home</title><script>track();</script></head>
          <body>
            <h1>Acme Corp</h1>
            <main>
              <p>We make   everything.</p>
              <p>Since 1947.</p>
            </main>
            <div class="contact"><span id="phone">555-0100</span></div>
          </body>
        </html>"#;

    #[test]
    fn extracts_title_body_fields() {
        let spec = ExtractionSpec::new()
            .with_field(FieldRule::new("phone", "#phone").required())
            .with_field(FieldRule::new("fax", "#fax"));

        let record = extract("https://acme.example", PAGE, &spec).unwrap();

        assert_eq!(record.title, "Acme Corp - Home");
        assert!(record.body.contains("We make everything."));
        assert!(record.body.contains("Since 1947."));
        assert_eq!(record.field("phone"), Some("555-0100"));
        // Optional missing fields are skipped, not recorded empty.
        assert_eq!(record.field("fax"), None);
        assert_eq!(record.fields.len(), 1);
    }

    #[test]
    fn extraction_is_idempotent() {
        let spec = ExtractionSpec::new().with_field(FieldRule::new("phone", "#phone"));

        let a = extract("https://acme.example", PAGE, &spec).unwrap();
        let b = extract("https://acme.example", PAGE, &spec).unwrap();

        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.title, b.title);
        assert_eq!(a.body, b.body);
        assert_eq!(a.fields, b.fields);
    }

    #[test]
    fn missing_required_field_fails() {
        let spec = ExtractionSpec::new().with_field(FieldRule::new("fax", "#fax").required());

        let err = extract("https://acme.example", PAGE, &spec).unwrap_err();
        assert!(matches!(err, ExtractError::MissingField { field } if field == "fax"));
    }

    #[test]
    fn empty_body_fails() {
        let html = "<html><body><main>   </main></body></html>";
        let spec = ExtractionSpec::new().with_body_selector("main");
        let err = extract("https://acme.example", html, &spec).unwrap_err();
        assert!(matches!(err, ExtractError::EmptyContent));
    }

    #[test]
    fn body_selector_chain_falls_through() {
        let html = "<html><body><article>Article text here.</article></body></html>";
        let record = extract("https://acme.example", html, &ExtractionSpec::new()).unwrap();
        assert_eq!(record.body, "Article text here.");
    }

    #[test]
    fn title_falls_back_to_h1() {
        let html = "<html><body><h1>Only Heading</h1><main>text</main></body></html>";
        let record = extract("https://acme.example", html, &ExtractionSpec::new()).unwrap();
        assert_eq!(record.title, "Only Heading");
    }
}
