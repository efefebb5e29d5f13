//! 基于 `roxmltree` 的结构解析

use super::{Attribute, Element, NamespaceDecl};
use crate::error::{FleurError, Result};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// 解析字节流为元素树
///
/// 非 UTF-8、标签未闭合、闭合标签不匹配、标签名含非法字符等
/// 均返回 `MalformedDocument`。
pub fn parse(bytes: &[u8]) -> Result<Element> {
    let text = std::str::from_utf8(bytes).map_err(|e| FleurError::MalformedDocument {
        line: 1,
        column: 1,
        reason: format!("document is not valid UTF-8: {}", e),
    })?;

    let doc = roxmltree::Document::parse(text).map_err(|e| {
        let pos = e.pos();
        FleurError::MalformedDocument {
            line: pos.row,
            column: pos.col,
            reason: e.to_string(),
        }
    })?;

    Ok(convert(doc.root_element()))
}

fn convert(node: roxmltree::Node<'_, '_>) -> Element {
    let namespace = node.tag_name().namespace().map(str::to_string);
    let prefix = node
        .tag_name()
        .namespace()
        .and_then(|uri| node.lookup_prefix(uri))
        .map(str::to_string);

    let attributes = node
        .attributes()
        .map(|a| Attribute {
            name: a.name().to_string(),
            namespace: a.namespace().map(str::to_string),
            prefix: a
                .namespace()
                .and_then(|uri| node.lookup_prefix(uri))
                .map(str::to_string),
            value: a.value().to_string(),
        })
        .collect();

    let mut text = String::new();
    let mut children = Vec::new();
    for child in node.children() {
        if child.is_element() {
            children.push(convert(child));
        } else if child.is_text() {
            if let Some(t) = child.text() {
                text.push_str(t);
            }
        }
    }
    let text = text.trim();

    Element {
        name: node.tag_name().name().to_string(),
        namespace,
        prefix,
        namespaces: declared_namespaces(node),
        attributes,
        children,
        text: (!text.is_empty()).then(|| text.to_string()),
    }
}

/// 仅返回在本元素上新声明的命名空间
fn declared_namespaces(node: roxmltree::Node<'_, '_>) -> Vec<NamespaceDecl> {
    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();

    node.namespaces()
        .filter(|ns| ns.uri() != XML_NAMESPACE)
        .filter(|ns| !inherited.contains(&(ns.name(), ns.uri())))
        .map(|ns| NamespaceDecl {
            prefix: ns.name().map(str::to_string),
            uri: ns.uri().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_order_and_text() {
        let xml = br#"<?xml version="1.0"?>
<root b="2" a="1">
   <first>  hello  </first>
   <second/>
   <first>again</first>
</root>"#;
        let root = parse(xml).unwrap();
        assert_eq!(root.name, "root");
        let attrs: Vec<_> = root.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(attrs, vec!["b", "a"]);
        let names: Vec<_> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "first"]);
        assert_eq!(root.children[0].text(), Some("hello"));
        assert_eq!(root.text(), None);
    }

    #[test]
    fn test_namespaces_resolved_to_local_names() {
        let xml = br#"<fleurInput xmlns:xi="http://www.w3.org/2001/XInclude">
   <xi:include href="sym.xml"/>
</fleurInput>"#;
        let root = parse(xml).unwrap();
        let include = root.child("include").unwrap();
        assert_eq!(
            include.namespace.as_deref(),
            Some("http://www.w3.org/2001/XInclude")
        );
        assert_eq!(include.prefix.as_deref(), Some("xi"));
        assert_eq!(root.namespaces.len(), 1);
        assert!(include.namespaces.is_empty());
    }

    #[test]
    fn test_mismatched_close_tag_is_malformed() {
        let err = parse(b"<a><b></a>").unwrap_err();
        assert!(matches!(err, FleurError::MalformedDocument { .. }));
    }

    #[test]
    fn test_unterminated_tag_is_malformed() {
        let err = parse(b"<a><b attr=\"1\"").unwrap_err();
        assert!(matches!(err, FleurError::MalformedDocument { .. }));
    }

    #[test]
    fn test_invalid_tag_character_is_malformed() {
        let err = parse(b"<a><1b/></a>").unwrap_err();
        assert!(matches!(err, FleurError::MalformedDocument { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let err = parse(&[0x3c, 0x61, 0x3e, 0xff, 0x3c, 0x2f, 0x61, 0x3e]).unwrap_err();
        assert!(matches!(err, FleurError::MalformedDocument { line: 1, .. }));
    }
}
