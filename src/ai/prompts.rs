//! Prompt templates for channel analysis.

use super::types::Topic;

pub const TOPICS_SYSTEM: &str =
    "You are an expert at analyzing team communications and identifying key discussion topics.";

pub const CONTRIBUTORS_SYSTEM: &str =
    "You are an expert at analyzing team dynamics and identifying key contributors in discussions.";

/// Rough purpose of a channel, guessed from its name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelKind {
    #[default]
    General,
    Project,
    Sales,
    Marketing,
}

impl ChannelKind {
    pub fn classify(channel_name: &str) -> Self {
        let name = channel_name.to_lowercase();
        if name.contains("project") {
            ChannelKind::Project
        } else if name.contains("sales") {
            ChannelKind::Sales
        } else if name.contains("marketing") {
            ChannelKind::Marketing
        } else {
            ChannelKind::General
        }
    }

    /// What the summary should cover for this kind of channel.
    fn focus(&self) -> &'static str {
        match self {
            ChannelKind::General => {
                r#"Include the following in the summary:
1. The overall purpose and tone of the channel
2. The core discussion for each major topic (2-3 sentences each)
3. Key decisions or agreements
4. Open issues or items that need follow-up
5. Notable opinions or ideas"#
            }
            ChannelKind::Project => {
                r#"This is a project channel. Analyze it in depth from these angles:
1. Project status and progress (Key Status)
2. Main proposals and plans (Key Proposals)
3. Technical or planning debates (Key Debates)
4. Decisions made (Decisions Made)
5. Upcoming plans and action items (Next Steps)
6. Risks or blockers (Risks & Blockers)"#
            }
            ChannelKind::Sales => {
                r#"This is a sales channel. Analyze it in depth from these angles:
1. Key deals and opportunities (Key Deals & Opportunities)
2. Revenue and performance (Revenue & Performance)
3. Customer feedback and requirements (Client Feedback)
4. Competitor or market developments (Competition & Market)
5. Main blockers for sales activity (Blockers)
6. Strategic suggestions or improvements"#
            }
            ChannelKind::Marketing => {
                r#"This is a marketing channel. Analyze it in depth from these angles:
1. Running campaigns and promotions (Active Campaigns)
2. Key metrics and analysis (KPIs & Metrics)
3. Per-channel performance and feedback (Channel Performance)
4. Creative and content discussions (Creative Feedback)
5. Budget and resource issues (Budget & Resources)
6. Upcoming marketing strategy and ideas"#
            }
        }
    }
}

pub fn topics_prompt(conversation: &str) -> String {
    format!(r#"Analyze the following Slack channel conversation and identify the main discussion topics.

For each topic, provide:
1. Topic name (short, descriptive)
2. Brief description (1-2 sentences)
3. Importance score (1-10, based on discussion length, participant count, urgency keywords)
4. Key keywords (3-5 words)
5. Sentiment breakdown (positive/negative/neutral message count estimate)

Format your response as JSON:
{{
  "topics": [
    {{
      "name": "Topic Name",
      "description": "Brief description",
      "importance": 8,
      "keywords": ["keyword1", "keyword2"],
      "sentiment": {{"positive": 5, "negative": 2, "neutral": 10}}
    }}
  ]
}}

Conversation:
{conversation}"#)
}

pub fn contributors_prompt(conversation: &str) -> String {
    format!(r#"Analyze the following Slack conversation and identify the key contributors.

For each significant contributor, provide:
1. Name
2. Approximate message count
3. Topics they're most involved in
4. Their key contributions or viewpoints (1-2 sentences each)

Format your response as JSON:
{{
  "contributors": [
    {{
      "name": "Person Name",
      "message_count": 15,
      "topics": ["Topic 1", "Topic 2"],
      "contributions": ["Led discussion on X", "Proposed solution for Y"]
    }}
  ]
}}

Conversation:
{conversation}"#)
}

pub fn summary_system(language: &str) -> String {
    format!(
        "You are an expert at analyzing team communication and summarizing the essentials clearly. Always respond in {language}."
    )
}

pub fn summary_prompt(channel: &str, topics: &[Topic], kind: ChannelKind, language: &str, conversation: &str) -> String {
    let topic_list: String = topics
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {} (importance: {}/10)\n", i + 1, t.name, t.importance))
        .collect();
    let focus = kind.focus();

    format!(r#"The following is the conversation from Slack channel #{channel}.

Main discussion topics:
{topic_list}
Analyze the conversation and write a comprehensive summary in {language}.

{focus}

Conversation:
{conversation}"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_channel_kind() {
        assert_eq!(ChannelKind::classify("proj-apollo"), ChannelKind::General);
        assert_eq!(ChannelKind::classify("Project-Apollo"), ChannelKind::Project);
        assert_eq!(ChannelKind::classify("sales-emea"), ChannelKind::Sales);
        assert_eq!(ChannelKind::classify("growth-marketing"), ChannelKind::Marketing);
        assert_eq!(ChannelKind::classify("random"), ChannelKind::General);
        // project wins over sales
        assert_eq!(ChannelKind::classify("sales-project"), ChannelKind::Project);
    }

    #[test]
    fn test_summary_prompt_lists_topics() {
        let topics = vec![
            Topic {
                name: "Release".into(),
                importance: 9,
                ..Default::default()
            },
            Topic {
                name: "Hiring".into(),
                importance: 4,
                ..Default::default()
            },
        ];
        let prompt = summary_prompt("sales-emea", &topics, ChannelKind::Sales, "Korean", "### a - b");

        assert!(prompt.contains("#sales-emea"));
        assert!(prompt.contains("1. Release (importance: 9/10)\n2. Hiring (importance: 4/10)\n"));
        assert!(prompt.contains("summary in Korean"));
        assert!(prompt.contains("Key Deals & Opportunities"));
        assert!(prompt.ends_with("### a - b"));
    }

    #[test]
    fn test_json_prompts_embed_conversation() {
        let prompt = topics_prompt("hello world");
        assert!(prompt.contains("\"topics\": ["));
        assert!(prompt.ends_with("Conversation:\nhello world"));

        let prompt = contributors_prompt("hi");
        assert!(prompt.contains("\"message_count\": 15"));
    }
}
