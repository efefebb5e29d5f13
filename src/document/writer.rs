//! 元素树序列化
//!
//! 输出格式固定：XML 声明、3 空格缩进（与 FLEUR 自身输出一致）、
//! 命名空间声明在前、属性按存储顺序，因此同一棵树总是得到相同字节。

use super::Element;

const INDENT: &str = "   ";

pub(super) fn write_document(root: &Element) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_element(root, 0, &mut out);
    out
}

fn write_element(el: &Element, depth: usize, out: &mut String) {
    let pad = INDENT.repeat(depth);
    let name = qualified(el.prefix.as_deref(), &el.name);

    out.push_str(&pad);
    out.push('<');
    out.push_str(&name);

    for ns in &el.namespaces {
        match &ns.prefix {
            Some(p) => out.push_str(&format!(" xmlns:{}=\"{}\"", p, escape(&ns.uri))),
            None => out.push_str(&format!(" xmlns=\"{}\"", escape(&ns.uri))),
        }
    }
    for attr in &el.attributes {
        out.push_str(&format!(
            " {}=\"{}\"",
            qualified(attr.prefix.as_deref(), &attr.name),
            escape(&attr.value)
        ));
    }

    match (&el.text, el.children.is_empty()) {
        (None, true) => out.push_str("/>\n"),
        (Some(text), true) => {
            out.push_str(&format!(">{}</{}>\n", escape(text), name));
        }
        (text, false) => {
            out.push_str(">\n");
            if let Some(text) = text {
                out.push_str(&format!("{}{}{}\n", pad, INDENT, escape(text)));
            }
            for child in &el.children {
                write_element(child, depth + 1, out);
            }
            out.push_str(&format!("{}</{}>\n", pad, name));
        }
    }
}

fn qualified(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) => format!("{}:{}", p, name),
        None => name.to_string(),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
