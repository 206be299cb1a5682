//! AdComposer：把商品格式化为一行带标记的 Markdown 赞助推荐
//!
//! 纯函数、无副作用；缺链接时返回 None（不投放）。

use crate::ads::ProductResult;

/// 广告与主回复之间的分隔
pub const AD_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct AdComposer {
    label: String,
}

impl Default for AdComposer {
    fn default() -> Self {
        Self {
            label: "Sponsored".to_string(),
        }
    }
}

/// 转义会破坏链接文本的 Markdown 字符
fn escape_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// 合并空白（含换行），保证广告只占一行
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 编码会提前结束 Markdown 链接目标的字符
fn escape_link_target(link: &str) -> String {
    let mut out = String::with_capacity(link.len());
    for c in link.trim().chars() {
        match c {
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            c if c.is_whitespace() => out.push_str("%20"),
            c => out.push(c),
        }
    }
    out
}

impl AdComposer {
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// 生成广告片段（不含前导分隔）
    pub fn compose(&self, product: &ProductResult, topic: Option<&str>) -> Option<String> {
        let link = product.link.as_deref()?;
        let mut line = format!("**{}** ▶ ", self.label);
        match topic {
            Some(topic) => line.push_str(&format!(
                "Because you've been talking about **{}**, you might like: ",
                single_line(topic)
            )),
            None => line.push_str("You might like: "),
        }
        line.push_str(&format!(
            "[{}]({})",
            escape_link_text(&single_line(&product.title)),
            escape_link_target(link)
        ));
        if let Some(desc) = product.description.as_deref().map(single_line) {
            if !desc.is_empty() {
                line.push_str(" — ");
                line.push_str(&desc);
            }
        }
        Some(line)
    }

    /// 追加到已生成的主回复末尾
    pub fn append_to(reply: &str, snippet: &str) -> String {
        format!("{reply}{AD_SEPARATOR}{snippet}")
    }
}
