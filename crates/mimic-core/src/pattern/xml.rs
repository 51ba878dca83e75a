//! XML content matching: structural equality and XPath extraction.
//!
//! Documents are parsed with `sxd-document` and converted into an owned
//! tree so compiled patterns stay `Send + Sync`.

use super::match_result::MatchResult;
use crate::error::MappingError;
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element};
use sxd_document::parser;

/// Owned, normalized XML element.
///
/// Attributes are sorted by name and whitespace-only text is dropped, so two
/// documents differing only in attribute order or indentation compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlChild>,
}

#[derive(Debug, Clone, PartialEq)]
enum XmlChild {
    Element(XmlNode),
    Text(String),
}

impl XmlNode {
    /// Parse a document into its root element.
    pub fn parse(xml: &str) -> Result<Self, String> {
        let package = parser::parse(xml).map_err(|e| format!("{e:?}"))?;
        let document = package.as_document();
        document
            .root()
            .children()
            .into_iter()
            .find_map(|child| match child {
                ChildOfRoot::Element(element) => Some(Self::from_element(element)),
                _ => None,
            })
            .ok_or_else(|| "document has no root element".to_string())
    }

    fn from_element(element: Element<'_>) -> Self {
        let name = qualified_name(
            element.name().namespace_uri(),
            element.name().local_part(),
        );

        let mut attributes: Vec<(String, String)> = element
            .attributes()
            .into_iter()
            .map(|attribute| {
                (
                    qualified_name(attribute.name().namespace_uri(), attribute.name().local_part()),
                    attribute.value().to_string(),
                )
            })
            .collect();
        attributes.sort();

        let mut children = Vec::new();
        for child in element.children() {
            match child {
                ChildOfElement::Element(inner) => {
                    children.push(XmlChild::Element(Self::from_element(inner)))
                }
                ChildOfElement::Text(text) => {
                    let trimmed = text.text().trim();
                    if !trimmed.is_empty() {
                        children.push(XmlChild::Text(trimmed.to_string()));
                    }
                }
                _ => {}
            }
        }

        Self {
            name,
            attributes,
            children,
        }
    }

    fn count_nodes(&self) -> usize {
        1 + self.attributes.len()
            + self
                .children
                .iter()
                .map(|child| match child {
                    XmlChild::Element(node) => node.count_nodes(),
                    XmlChild::Text(_) => 1,
                })
                .sum::<usize>()
    }
}

fn qualified_name(namespace: Option<&str>, local: &str) -> String {
    match namespace {
        Some(ns) => format!("{{{ns}}}{local}"),
        None => local.to_string(),
    }
}

/// Compiled structural XML equality.
#[derive(Debug, Clone)]
pub struct XmlEquality {
    expected: XmlNode,
}

impl XmlEquality {
    pub fn compile(expected: &str) -> Result<Self, MappingError> {
        let expected = XmlNode::parse(expected).map_err(MappingError::InvalidXml)?;
        Ok(Self { expected })
    }

    pub fn evaluate(&self, actual: &str) -> MatchResult {
        let Ok(actual) = XmlNode::parse(actual) else {
            return MatchResult::no_match().with_description("body is not valid XML");
        };
        let mut differences = 0;
        let mut reports = Vec::new();
        compare(
            &format!("/{}", self.expected.name),
            &self.expected,
            &actual,
            &mut differences,
            &mut reports,
        );
        if differences == 0 {
            return MatchResult::exact_match();
        }
        let nodes = self.expected.count_nodes().max(actual.count_nodes());
        MatchResult::partial(differences as f64 / nodes as f64).with_description(reports.join("\n"))
    }
}

fn compare(
    path: &str,
    expected: &XmlNode,
    actual: &XmlNode,
    differences: &mut usize,
    reports: &mut Vec<String>,
) {
    if expected.name != actual.name {
        *differences += expected.count_nodes();
        reports.push(format!(
            "{path}: expected element {} but was {}",
            expected.name, actual.name
        ));
        return;
    }
    if expected.attributes != actual.attributes {
        let mismatched = expected
            .attributes
            .iter()
            .filter(|attribute| !actual.attributes.contains(attribute))
            .count()
            .max(1);
        *differences += mismatched;
        reports.push(format!("{path}: attributes differ"));
    }

    let longest = expected.children.len().max(actual.children.len());
    for index in 0..longest {
        match (expected.children.get(index), actual.children.get(index)) {
            (Some(XmlChild::Element(e)), Some(XmlChild::Element(a))) => {
                compare(&format!("{path}/{}", e.name), e, a, differences, reports)
            }
            (Some(XmlChild::Text(e)), Some(XmlChild::Text(a))) if e == a => {}
            (Some(XmlChild::Text(e)), Some(XmlChild::Text(a))) => {
                *differences += 1;
                reports.push(format!("{path}/text(): expected '{e}' but was '{a}'"));
            }
            (Some(expected_child), _) => {
                *differences += match expected_child {
                    XmlChild::Element(node) => node.count_nodes(),
                    XmlChild::Text(_) => 1,
                };
                reports.push(format!("{path}: child {} differs or is missing", index + 1));
            }
            (None, Some(_)) => {
                *differences += 1;
                reports.push(format!("{path}: unexpected child {}", index + 1));
            }
            (None, None) => {}
        }
    }
}

/// Validate an XPath expression at registration time.
///
/// `sxd-xpath` compiled expressions are not thread-safe, so only the
/// expression text is kept and evaluated per request.
pub fn validate_xpath(expression: &str) -> Result<(), MappingError> {
    let package =
        parser::parse("<mimic/>").map_err(|e| MappingError::InvalidXml(format!("{e:?}")))?;
    let document = package.as_document();
    sxd_xpath::evaluate_xpath(&document, expression)
        .map(|_| ())
        .map_err(|e| MappingError::InvalidXPath {
            expression: expression.to_string(),
            message: e.to_string(),
        })
}

/// Evaluate an XPath against a document given as text.
///
/// Returns `None` when the input is not valid XML or evaluation fails,
/// otherwise the string value of every selected item. A `false` boolean
/// result counts as an empty selection.
pub fn extract_xpath(body: &str, expression: &str) -> Option<Vec<String>> {
    use sxd_xpath::{evaluate_xpath, Value};

    let package = parser::parse(body).ok()?;
    let document = package.as_document();

    match evaluate_xpath(&document, expression).ok()? {
        Value::Nodeset(nodes) => Some(
            nodes
                .document_order()
                .into_iter()
                .map(|node| node.string_value())
                .collect(),
        ),
        Value::Boolean(true) => Some(vec!["true".to_string()]),
        Value::Boolean(false) => Some(Vec::new()),
        Value::Number(n) => {
            // Format integral numbers without a trailing ".0"
            if n.fract() == 0.0 {
                Some(vec![format!("{}", n as i64)])
            } else {
                Some(vec![n.to_string()])
            }
        }
        Value::String(s) => Some(vec![s]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_equality_ignores_whitespace_and_attribute_order() {
        let matcher =
            XmlEquality::compile(r#"<order id="1" kind="a"><item>x</item></order>"#).unwrap();
        let actual = r#"
            <order kind="a" id="1">
                <item>x</item>
            </order>"#;
        assert!(matcher.evaluate(actual).is_exact());
    }

    #[test]
    fn test_xml_equality_reports_text_difference() {
        let matcher = XmlEquality::compile("<order><item>x</item></order>").unwrap();
        let result = matcher.evaluate("<order><item>y</item></order>");
        assert!(!result.is_exact());
        assert!(result.distance() < 1.0);
        assert!(result.description().unwrap().contains("/order/item"));
    }

    #[test]
    fn test_xml_equality_malformed_body() {
        let matcher = XmlEquality::compile("<a/>").unwrap();
        let result = matcher.evaluate("{\"json\": true}");
        assert_eq!(result.distance(), 1.0);
    }

    #[test]
    fn test_xml_equality_rejects_invalid_expected() {
        assert!(matches!(
            XmlEquality::compile("<unclosed>"),
            Err(MappingError::InvalidXml(_))
        ));
    }

    #[test]
    fn test_extract_xpath() {
        let xml = r#"<root><user id="7"><name>Ann</name></user></root>"#;
        assert_eq!(
            extract_xpath(xml, "/root/user/name").unwrap(),
            vec!["Ann".to_string()]
        );
        assert_eq!(
            extract_xpath(xml, "/root/user/@id").unwrap(),
            vec!["7".to_string()]
        );
        assert!(extract_xpath(xml, "/root/missing").unwrap().is_empty());
        assert!(extract_xpath("not xml", "/root").is_none());
    }

    #[test]
    fn test_validate_xpath() {
        assert!(validate_xpath("/root/user[@id='7']").is_ok());
        assert!(validate_xpath("/root/[").is_err());
    }
}
