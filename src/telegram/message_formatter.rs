use chrono_tz::Tz;

use crate::core::models::{Language, SummaryDocument, TimeRange};
use crate::utils::markup;

const TOP_PARTICIPANTS_SHOWN: usize = 5;

struct FooterLabels {
    title: &'static str,
    messages: &'static str,
    participants: &'static str,
    time_range: &'static str,
    most_active: &'static str,
    tokens: &'static str,
    reconstructed: &'static str,
}

impl FooterLabels {
    fn for_language(language: Language) -> &'static FooterLabels {
        match language {
            Language::En => &FooterLabels {
                title: "Statistics",
                messages: "Messages analyzed",
                participants: "Participants",
                time_range: "Time range",
                most_active: "Most active",
                tokens: "Tokens used",
                reconstructed: "Parts of this summary were reconstructed from an incomplete response.",
            },
            Language::Zh => &FooterLabels {
                title: "统计",
                messages: "分析消息数",
                participants: "参与人数",
                time_range: "时间范围",
                most_active: "最活跃",
                tokens: "消耗 Token",
                reconstructed: "部分摘要内容由不完整的回复重建。",
            },
        }
    }
}

/// A summary ready to send: body and statistics footer in the markup
/// dialect, kept apart so segmentation can send the footer on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSummary {
    pub body: String,
    pub footer: String,
}

impl RenderedSummary {
    #[must_use]
    pub fn full_text(&self) -> String {
        format!("{}\n\n{}", self.body, self.footer)
    }

    #[must_use]
    pub fn char_count(&self) -> usize {
        self.full_text().chars().count()
    }
}

fn format_time_range(range: &TimeRange, tz: Tz) -> String {
    let zone = markup::escape(tz.name());
    let start = range.start.with_timezone(&tz);
    let end = range.end.with_timezone(&tz);
    if start.date_naive() == end.date_naive() {
        format!(
            "{} {} to {} ({})",
            start.format("%Y-%m-%d"),
            start.format("%H:%M"),
            end.format("%H:%M"),
            zone
        )
    } else {
        format!(
            "{} to {} ({})",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M"),
            zone
        )
    }
}

/// Renders the statistics footer. Participant names and the zone name are
/// escaped so the footer is valid markup on its own.
#[must_use]
pub fn render_footer(document: &SummaryDocument, tz: Tz) -> String {
    let labels = FooterLabels::for_language(document.language);
    let mut lines = vec![
        format!("*{}*", labels.title),
        format!("{}: {}", labels.messages, document.messages_analyzed),
        format!("{}: {}", labels.participants, document.unique_users),
    ];
    if let Some(range) = &document.time_range {
        lines.push(format!("{}: {}", labels.time_range, format_time_range(range, tz)));
    }
    if !document.top_participants.is_empty() {
        let top = document
            .top_participants
            .iter()
            .take(TOP_PARTICIPANTS_SHOWN)
            .map(|p| format!("{} ({})", markup::escape(&p.name), p.message_count))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("{}: {}", labels.most_active, top));
    }
    if document.usage.total_tokens > 0 {
        lines.push(format!("{}: {}", labels.tokens, document.usage.total_tokens));
    }
    if document.recovered {
        lines.push(format!("_{}_", labels.reconstructed));
    }
    lines.join("\n")
}

#[must_use]
pub fn render_summary(document: &SummaryDocument, tz: Tz) -> RenderedSummary {
    RenderedSummary {
        body: document.body.trim_end().to_string(),
        footer: render_footer(document, tz),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{TopParticipant, Usage};
    use chrono::{TimeZone, Utc};

    fn document() -> SummaryDocument {
        SummaryDocument {
            body: "*Overview*\nAll good\n".to_string(),
            language: Language::En,
            messages_analyzed: 3,
            unique_users: 2,
            time_range: Some(TimeRange {
                start: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2024, 5, 1, 11, 30, 0).unwrap(),
            }),
            top_participants: vec![TopParticipant {
                name: "ann_b".to_string(),
                message_count: 2,
            }],
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            provider: None,
            recovered: false,
        }
    }

    #[test]
    fn footer_lists_statistics_in_display_timezone() {
        let footer = render_footer(&document(), chrono_tz::Asia::Shanghai);
        assert!(footer.starts_with("*Statistics*\n"));
        assert!(footer.contains("Messages analyzed: 3"));
        assert!(footer.contains("Participants: 2"));
        assert!(footer.contains("2024-05-01 18:00 to 19:30 (Asia/Shanghai)"));
        assert!(footer.contains("ann\\_b (2)"));
        assert!(footer.contains("Tokens used: 15"));
    }

    #[test]
    fn zone_names_with_underscores_are_escaped() {
        let footer = render_footer(&document(), chrono_tz::America::New_York);
        assert!(footer.contains("2024-05-01 06:00 to 07:30 (America/New\\_York)"));
        assert_eq!(markup::repair(&footer), footer);
    }

    #[test]
    fn recovered_documents_carry_a_note() {
        let mut doc = document();
        doc.recovered = true;
        doc.language = Language::Zh;
        let rendered = render_summary(&doc, Tz::UTC);
        assert_eq!(rendered.body, "*Overview*\nAll good");
        assert!(rendered.footer.contains("部分摘要内容"));
        assert!(rendered.full_text().contains("\n\n*统计*"));
    }
}
