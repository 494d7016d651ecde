//! HTML and plain-text rendering of a digest.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as esc};

use crate::model::{Article, Category, Subscriber};

pub fn subject(now: DateTime<Utc>, count: usize) -> String {
    format!("AI News Digest – {} ({count} stories)", now.format("%B %d, %Y"))
}

/// Articles grouped by category in the fixed category order; empty groups omitted.
fn grouped(articles: &[Article]) -> Vec<(Category, Vec<&Article>)> {
    Category::ANALYZED
        .iter()
        .map(|c| (*c, articles.iter().filter(|a| a.category == *c).collect::<Vec<_>>()))
        .filter(|(_, v)| !v.is_empty())
        .collect()
}

fn article_html(out: &mut String, a: &Article) {
    let _ = write!(
        out,
        r#"<div style="margin:0 0 20px;padding:14px;border:1px solid #e5e7eb;border-radius:8px">
<a href="{}" style="font-size:16px;font-weight:600;color:#1d4ed8;text-decoration:none">{}</a>
<div style="font-size:12px;color:#6b7280;margin:4px 0">{} · relevance {}/10</div>
"#,
        attr(&a.url),
        esc(&a.title),
        esc(&a.source),
        a.relevance_score.unwrap_or_default(),
    );
    if let Some(summary) = a.summary.as_deref() {
        let _ = writeln!(out, r#"<p style="margin:6px 0;color:#111827">{}</p>"#, esc(summary));
    }
    if !a.tags.is_empty() {
        let tags: Vec<String> = a.tags.iter().map(|t| esc(t).into_owned()).collect();
        let _ = writeln!(
            out,
            r#"<div style="font-size:12px;color:#6b7280">{}</div>"#,
            tags.join(" · ")
        );
    }
    if let Some(product) = a.product_name.as_deref() {
        if !a.competitors.is_empty() {
            let _ = writeln!(
                out,
                r#"<table style="width:100%;border-collapse:collapse;font-size:13px;margin-top:8px">
<tr><th align="left">{} vs</th><th align="left">What it is</th><th align="left">Comparison</th></tr>"#,
                esc(product)
            );
            for c in &a.competitors {
                let _ = writeln!(
                    out,
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    esc(&c.name),
                    esc(&c.description),
                    esc(&c.comparison)
                );
            }
            out.push_str("</table>\n");
        }
        if let Some(adv) = a.competitive_advantage.as_deref() {
            let _ = writeln!(
                out,
                r#"<p style="margin:8px 0 0;font-size:13px"><strong>Edge:</strong> {}</p>"#,
                esc(adv)
            );
        }
    }
    out.push_str("</div>\n");
}

pub fn html(sub: &Subscriber, articles: &[Article], now: DateTime<Utc>, app_url: &str) -> String {
    let mut out = String::with_capacity(4096);
    let _ = write!(
        out,
        r#"<!doctype html><html><body style="font-family:Arial,sans-serif;max-width:680px;margin:auto">
<h1 style="font-size:22px">AI News Digest</h1>
<p style="color:#6b7280">{} · {} stories for {}</p>
"#,
        now.format("%B %d, %Y"),
        articles.len(),
        esc(&sub.name),
    );
    for (cat, items) in grouped(articles) {
        let _ = writeln!(out, r#"<h2 style="font-size:18px;margin-top:28px">{}</h2>"#, esc(cat.as_str()));
        for a in items {
            article_html(&mut out, a);
        }
    }
    if !app_url.is_empty() {
        let _ = writeln!(
            out,
            r#"<p style="font-size:12px;color:#6b7280">Browse everything at <a href="{}">{}</a></p>"#,
            attr(app_url),
            esc(app_url)
        );
    }
    out.push_str("</body></html>\n");
    out
}

pub fn text(sub: &Subscriber, articles: &[Article], now: DateTime<Utc>, app_url: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "AI News Digest - {} ({} stories for {})\n",
        now.format("%B %d, %Y"),
        articles.len(),
        sub.name
    );
    for (cat, items) in grouped(articles) {
        let _ = writeln!(out, "== {} ==", cat);
        for a in items {
            let _ = writeln!(
                out,
                "* {} [{}/10] ({})\n  {}",
                a.title,
                a.relevance_score.unwrap_or_default(),
                a.source,
                a.url
            );
            if let Some(s) = a.summary.as_deref() {
                let _ = writeln!(out, "  {s}");
            }
            for c in &a.competitors {
                let _ = writeln!(out, "  vs {}: {}", c.name, c.comparison);
            }
            if let Some(adv) = a.competitive_advantage.as_deref() {
                let _ = writeln!(out, "  Edge: {adv}");
            }
        }
        out.push('\n');
    }
    if !app_url.is_empty() {
        let _ = writeln!(out, "More: {app_url}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Competitor;
    use chrono::TimeZone;

    #[test]
    fn html_escapes_and_groups_by_category() {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap();
        let mut tool = Article::new("<Acme> 2.0", "https://acme.dev/?a=1&b=2", "HN", now);
        tool.category = Category::ProductTool;
        tool.relevance_score = Some(8);
        tool.product_name = Some("Acme".into());
        tool.competitors = vec![Competitor {
            name: "Other".into(),
            description: "d".into(),
            comparison: "faster".into(),
        }];
        let mut paper = Article::new("Paper", "https://arxiv.org/abs/1", "arXiv", now);
        paper.category = Category::ResearchPaper;
        paper.relevance_score = Some(6);

        let sub = Subscriber::new("a@b.io", "Ann");
        let out = html(&sub, &[paper, tool], now, "https://news.example");
        assert!(out.contains("&lt;Acme&gt; 2.0"));
        assert!(out.contains("a=1&amp;b=2"));
        assert!(out.contains("<td>Other</td>"));
        let tools_at = out.find("Product/Tool").unwrap();
        let papers_at = out.find("Research Paper").unwrap();
        assert!(tools_at < papers_at);
        assert_eq!(subject(now, 2), "AI News Digest – March 02, 2025 (2 stories)");
    }
}
