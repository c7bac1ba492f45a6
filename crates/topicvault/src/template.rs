//! # Template Engine
//!
//! Seed documents are rendered from [`FileTemplate`]s with a deliberately tiny
//! mustache-like syntax. There is no escaping, no nesting, and no I/O.
//!
//! ## Syntax
//!
//! - `{{name}}`: replaced by the stringified value of `name`, or the empty string
//!   when `name` is not defined.
//! - `{{#name}}...{{/name}}`: a section. When `name` is a [`TemplateValue::List`],
//!   the body is repeated once per element with `{{.}}` standing for the element.
//!   When `name` is [`TemplateValue::Records`], the body is repeated once per record
//!   and each of the record's keys is substituted by name. Any other value (or a
//!   missing key) renders the whole section as empty.
//!
//! The template is scanned once. Values are inserted verbatim and never scanned
//! again, so user text containing `{{...}}` survives untouched. Inside a section,
//! global variables stay visible and a record key that shadows one wins.
//!
//! ## Optional Sections
//!
//! `Option<String>` converts into a list of zero or one element, which makes
//! "render this block only when the value is present" a plain section:
//!
//! ```text
//! {{#source_url}}**URL:** {{.}}{{/source_url}}
//! ```

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    Text(String),
    List(Vec<String>),
    Records(Vec<BTreeMap<String, String>>),
}

impl TemplateValue {
    /// Scalar form used by `{{name}}`. Lists join with commas; records render empty.
    pub fn as_scalar(&self) -> String {
        match self {
            TemplateValue::Text(text) => text.clone(),
            TemplateValue::List(items) => items.join(","),
            TemplateValue::Records(_) => String::new(),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        TemplateValue::Text(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        TemplateValue::Text(value)
    }
}

impl From<u8> for TemplateValue {
    fn from(value: u8) -> Self {
        TemplateValue::Text(value.to_string())
    }
}

impl From<u32> for TemplateValue {
    fn from(value: u32) -> Self {
        TemplateValue::Text(value.to_string())
    }
}

impl From<Vec<String>> for TemplateValue {
    fn from(value: Vec<String>) -> Self {
        TemplateValue::List(value)
    }
}

impl From<Option<String>> for TemplateValue {
    fn from(value: Option<String>) -> Self {
        TemplateValue::List(value.into_iter().collect())
    }
}

impl From<Vec<BTreeMap<String, String>>> for TemplateValue {
    fn from(value: Vec<BTreeMap<String, String>>) -> Self {
        TemplateValue::Records(value)
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_scalar())
    }
}

pub type TemplateVars = BTreeMap<String, TemplateValue>;

/// Builds a [`TemplateVars`] map from `key => value` pairs.
#[macro_export]
macro_rules! template_vars {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut vars = $crate::template::TemplateVars::new();
        $(vars.insert($key.to_string(), $crate::template::TemplateValue::from($value));)*
        vars
    }};
}

/// A named markdown document with placeholders. Compile-time constant data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTemplate {
    pub name: &'static str,
    pub content: &'static str,
}

impl FileTemplate {
    pub fn render(&self, vars: &TemplateVars) -> String {
        render(self.content, vars)
    }
}

pub const OVERVIEW: FileTemplate = FileTemplate {
    name: "overview.md",
    content: "# {{title}}

**Category:** {{category}}
**Complexity:** {{complexity_level}}/10
**Created:** {{created_at}}

## Description
{{description}}

## Key Context
-

## Related Topics
-

## Notes
-
",
};

pub const POSITION: FileTemplate = FileTemplate {
    name: "my-position.md",
    content: "# My Position on {{title}}

**Stance:** {{position}}
**Conviction:** {{conviction}}/10
**Last Updated:** {{last_modified}}

## Core Position
Write your main stance here...

## Key Reasoning
1.
2.
3.

## Potential Weaknesses
-
-

## Position Evolution
*Track how your thinking has changed*
-
",
};

pub const ARGUMENT: FileTemplate = FileTemplate {
    name: "argument-template.md",
    content: "# {{title}}

**Type:** {{type}}
**Strength:** {{strength}}/5
**Created:** {{created_at}}

## Argument
{{content}}

## Supporting Evidence
{{#evidence_ids}}- [[evidence/{{.}}]]
{{/evidence_ids}}
## Counter-arguments to Consider
-

## Refinements
-
",
};

pub const EVIDENCE: FileTemplate = FileTemplate {
    name: "evidence-template.md",
    content: "# {{title}}

**Type:** {{type}}
**Source:** {{source}}
**Credibility:** {{credibility}}/5
**Date Added:** {{created_at}}

## Content
{{content}}

## Source Details
{{#source_url}}**URL:** {{.}}
{{/source_url}}
## Analysis
- **Strengths:**
- **Limitations:**
- **Context:**

## Usage Notes
-
",
};

pub const PRACTICE: FileTemplate = FileTemplate {
    name: "practice-session.md",
    content: "# Practice Session - {{session_date}}

**Overall Rating:** {{rating}}/5

## Performance Notes
{{performance_notes}}

## Strengths Demonstrated
{{#strengths}}- {{.}}
{{/strengths}}
## Areas for Improvement
{{#areas_for_improvement}}- {{.}}
{{/areas_for_improvement}}
{{#ai_feedback}}## AI Feedback
{{.}}

{{/ai_feedback}}## Action Items
-
-

## Next Session Goals
-
",
};

/// Renders `template` against `vars`. See the module docs for the syntax.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    render_in(template, vars, Scope::Global)
}

/// What a section body is being rendered for.
#[derive(Clone, Copy)]
enum Scope<'a> {
    Global,
    Item(&'a str),
    Record(&'a BTreeMap<String, String>),
}

/// One left-to-right scan. Substituted text is appended to the output and never
/// scanned again.
fn render_in(text: &str, vars: &TemplateVars, scope: Scope<'_>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str("{{");
            rest = after;
            continue;
        };
        let tag = &after[..end];
        let tail = &after[end + 2..];

        if let (Some(name), Scope::Global) = (tag.strip_prefix('#'), scope) {
            let close = format!("{{{{/{}}}}}", name);
            if let Some(close_at) = tail.find(&close).filter(|_| is_key(name)) {
                out.push_str(&expand_section(&tail[..close_at], vars, vars.get(name)));
                rest = &tail[close_at + close.len()..];
                continue;
            }
        }

        let is_item = tag == "." && matches!(scope, Scope::Item(_));
        if is_item || is_key(tag) {
            out.push_str(&lookup(tag, vars, scope).unwrap_or_default());
            rest = tail;
        } else {
            out.push_str("{{");
            rest = after;
        }
    }

    out.push_str(rest);
    out
}

fn expand_section(body: &str, vars: &TemplateVars, value: Option<&TemplateValue>) -> String {
    match value {
        Some(TemplateValue::List(items)) => items
            .iter()
            .map(|item| render_in(body, vars, Scope::Item(item)))
            .collect(),
        Some(TemplateValue::Records(records)) => records
            .iter()
            .map(|record| render_in(body, vars, Scope::Record(record)))
            .collect(),
        _ => String::new(),
    }
}

/// Record keys shadow globals inside their own section.
fn lookup(tag: &str, vars: &TemplateVars, scope: Scope<'_>) -> Option<String> {
    match scope {
        Scope::Item(item) if tag == "." => return Some(item.to_string()),
        Scope::Record(record) => {
            if let Some(value) = record.get(tag) {
                return Some(value.clone());
            }
        }
        _ => {}
    }
    vars.get(tag).map(TemplateValue::as_scalar)
}

fn is_key(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_scalar_and_list_section() {
        let vars = template_vars! {
            "name" => "Ann",
            "xs" => vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            render("Hi {{name}}, items: {{#xs}}[{{.}}]{{/xs}}", &vars),
            "Hi Ann, items: [a][b]"
        );
    }

    #[test]
    fn test_undefined_scalar_renders_empty() {
        let vars = TemplateVars::new();
        assert_eq!(render("a{{missing}}b", &vars), "ab");
    }

    #[test]
    fn test_non_list_section_renders_empty() {
        let vars = template_vars! { "flag" => "yes" };
        assert_eq!(render("<{{#flag}}shown{{/flag}}>", &vars), "<>");
        assert_eq!(render("<{{#nope}}shown{{/nope}}>", &vars), "<>");
    }

    #[test]
    fn test_record_section_substitutes_own_keys() {
        let vars = template_vars! {
            "topic" => "Energy",
            "people" => vec![
                record(&[("name", "Ann"), ("role", "pro")]),
                record(&[("name", "Bo"), ("role", "con")]),
            ],
        };
        assert_eq!(
            render("{{#people}}{{name}}:{{role}}@{{topic}};{{/people}}", &vars),
            "Ann:pro@Energy;Bo:con@Energy;"
        );
    }

    #[test]
    fn test_optional_value_as_section() {
        let present = template_vars! { "url" => Some("https://x.test".to_string()) };
        let absent = template_vars! { "url" => None::<String> };
        let tpl = "{{#url}}URL: {{.}}{{/url}}";
        assert_eq!(render(tpl, &present), "URL: https://x.test");
        assert_eq!(render(tpl, &absent), "");
    }

    #[test]
    fn test_list_scalar_joins_with_commas() {
        let vars = template_vars! { "xs" => vec!["a".to_string(), "b".to_string()] };
        assert_eq!(render("{{xs}}", &vars), "a,b");
    }

    #[test]
    fn test_malformed_tags_are_left_alone() {
        let vars = template_vars! { "a" => "1" };
        assert_eq!(render("{{ a }} {{a", &vars), "{{ a }} {{a");
        assert_eq!(render("{{#a}}never closed", &vars), "{{#a}}never closed");
    }

    #[test]
    fn test_inserted_values_are_not_rescanned() {
        let vars = template_vars! {
            "title" => "Energy",
            "xs" => vec!["use {{title}} and {{braces}}".to_string()],
            "note" => "{{#xs}}x{{/xs}}",
        };
        assert_eq!(
            render("{{#xs}}- {{.}}{{/xs}}", &vars),
            "- use {{title}} and {{braces}}"
        );
        assert_eq!(render("{{note}}", &vars), "{{#xs}}x{{/xs}}");

        let people = template_vars! {
            "people" => vec![record(&[("name", "{{title}}")])],
            "title" => "Energy",
        };
        assert_eq!(render("{{#people}}{{name}}/{{title}}{{/people}}", &people), "{{title}}/Energy");
    }

    #[test]
    fn test_practice_template_omits_missing_feedback() {
        let vars = template_vars! {
            "session_date" => "2024-05-01",
            "rating" => 4u8,
            "performance_notes" => "Solid opening",
            "strengths" => vec!["pacing".to_string()],
            "areas_for_improvement" => Vec::<String>::new(),
            "ai_feedback" => None::<String>,
        };
        let out = PRACTICE.render(&vars);
        assert!(out.starts_with("# Practice Session - 2024-05-01"));
        assert!(out.contains("- pacing\n"));
        assert!(!out.contains("AI Feedback"));
        assert!(!out.contains("{{"));
    }
}
