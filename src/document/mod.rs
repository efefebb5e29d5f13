//! # 通用 XML 文档模型
//!
//! 将字节流加载为元素树（标签、有序属性、有序子元素、可选文本），
//! 并能以确定的属性顺序和统一缩进写回。本层只做结构解析，不做语义校验。
//!
//! ## 依赖关系
//! - 被 `parsers/detect.rs`, `parsers/inpxml.rs`, `parsers/outxml.rs` 使用
//! - 子模块: reader (基于 `roxmltree`), writer

mod reader;
mod writer;

pub use reader::parse;

/// 元素属性
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// 本地名
    pub name: String,
    /// 命名空间 URI
    pub namespace: Option<String>,
    /// 写回时使用的前缀
    pub prefix: Option<String>,
    pub value: String,
}

/// 元素上声明的命名空间 (前缀, URI)，前缀为 `None` 表示默认命名空间
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    pub prefix: Option<String>,
    pub uri: String,
}

/// 文档树中的元素
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// 本地名（不含前缀）
    pub name: String,
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    /// 本元素上新声明的命名空间
    pub namespaces: Vec<NamespaceDecl>,
    /// 按文档顺序排列的属性
    pub attributes: Vec<Attribute>,
    /// 按文档顺序排列的子元素
    pub children: Vec<Element>,
    /// 去除首尾空白后的直接文本内容
    pub text: Option<String>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// 按本地名读取属性（忽略命名空间）
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// 按命名空间和本地名读取属性
    pub fn attr_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.namespace.as_deref() == Some(namespace))
            .map(|a| a.value.as_str())
    }

    /// 设置属性；已存在时原位替换值，保持属性顺序不变
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute {
                name,
                namespace: None,
                prefix: None,
                value,
            }),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// 第一个本地名匹配的子元素
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// 所有本地名匹配的子元素
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// 按 `a/b/c` 形式的相对路径查找，每一级取第一个匹配
    pub fn find_path(&self, path: &str) -> Option<&Element> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |el, part| el.child(part))
    }

    /// 前序遍历所有后代元素（不含自身）
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// 文档顺序中第一个本地名匹配的后代元素
    pub fn find_descendant(&self, name: &str) -> Option<&Element> {
        self.descendants().find(|e| e.name == name)
    }

    /// 对自身及所有本地名匹配的后代元素执行修改，返回修改数量
    pub fn update_named<F>(&mut self, name: &str, f: &mut F) -> usize
    where
        F: FnMut(&mut Element),
    {
        let mut count = 0;
        if self.name == name {
            f(self);
            count += 1;
        }
        for child in &mut self.children {
            count += child.update_named(name, f);
        }
        count
    }

    /// 序列化为带 XML 声明的字符串
    pub fn to_xml_string(&self) -> String {
        writer::write_document(self)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_xml_string().into_bytes()
    }
}

/// 后代元素迭代器
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}
