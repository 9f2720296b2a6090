use crate::bus::{EventBus, UiSignal};
use crate::state::SearchResult;

pub const CONTACT_EMAIL: &str = "allioladapo5@gmail.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCategory {
    Navigation,
    Actions,
    Search,
}

impl CommandCategory {
    pub fn title(&self) -> &'static str {
        match self {
            CommandCategory::Navigation => "NAVIGATION",
            CommandCategory::Actions => "ACTIONS",
            CommandCategory::Search => "SEARCH",
        }
    }
}

/// The side effect a command performs when activated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    Navigate(String),
    OpenChat,
    OpenExternal(String),
    CopyToClipboard(String),
}

impl CommandAction {
    pub fn perform(&self, bus: &EventBus) {
        match self {
            CommandAction::Navigate(href) => bus.publish(UiSignal::Navigate(href.clone())),
            CommandAction::OpenChat => bus.publish(UiSignal::OpenChat),
            CommandAction::OpenExternal(url) => bus.publish(UiSignal::OpenExternal(url.clone())),
            CommandAction::CopyToClipboard(text) => bus.publish(UiSignal::CopyToClipboard(text.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: String,
    pub label: String,
    pub icon: &'static str,
    pub action: CommandAction,
    pub category: CommandCategory,
    pub preview: Option<String>,
}

struct StaticCommand {
    id: &'static str,
    label: &'static str,
    icon: &'static str,
    category: CommandCategory,
    action: fn(&str) -> CommandAction,
}

const STATIC_COMMANDS: [StaticCommand; 9] = [
    StaticCommand {
        id: "nav-home",
        label: "Go to Home",
        icon: "⌂",
        category: CommandCategory::Navigation,
        action: |_| CommandAction::Navigate("/#hero".to_string()),
    },
    StaticCommand {
        id: "nav-projects",
        label: "Go to Projects",
        icon: "▣",
        category: CommandCategory::Navigation,
        action: |_| CommandAction::Navigate("/#projects".to_string()),
    },
    StaticCommand {
        id: "nav-stack",
        label: "Go to Tech Stack",
        icon: "≡",
        category: CommandCategory::Navigation,
        action: |_| CommandAction::Navigate("/#stack".to_string()),
    },
    StaticCommand {
        id: "nav-experience",
        label: "Go to Experience",
        icon: "◷",
        category: CommandCategory::Navigation,
        action: |_| CommandAction::Navigate("/#experience".to_string()),
    },
    StaticCommand {
        id: "nav-contact",
        label: "Go to Contact",
        icon: "✉",
        category: CommandCategory::Navigation,
        action: |_| CommandAction::Navigate("/#contact".to_string()),
    },
    StaticCommand {
        id: "action-chat",
        label: "Ask Charon",
        icon: "◆",
        category: CommandCategory::Actions,
        action: |_| CommandAction::OpenChat,
    },
    StaticCommand {
        id: "action-email",
        label: "Copy Email Address",
        icon: "@",
        category: CommandCategory::Actions,
        action: |_| CommandAction::CopyToClipboard(CONTACT_EMAIL.to_string()),
    },
    StaticCommand {
        id: "action-github",
        label: "Open GitHub Profile",
        icon: "↗",
        category: CommandCategory::Actions,
        action: |_| CommandAction::OpenExternal("https://github.com/AAEO04".to_string()),
    },
    StaticCommand {
        id: "action-resume",
        label: "Download Resume",
        icon: "↓",
        category: CommandCategory::Actions,
        action: |api_url| CommandAction::OpenExternal(format!("{api_url}/resume")),
    },
];

/// The built-in command table. `api_url` is where the resume is served from.
pub fn static_commands(api_url: &str) -> Vec<Command> {
    STATIC_COMMANDS
        .iter()
        .map(|c| Command {
            id: c.id.to_string(),
            label: c.label.to_string(),
            icon: c.icon,
            action: (c.action)(api_url),
            category: c.category,
            preview: None,
        })
        .collect()
}

/// Case-insensitive substring filter on the label
pub fn filter_commands<'a>(commands: &'a [Command], query: &str) -> Vec<&'a Command> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return commands.iter().collect();
    }
    commands
        .iter()
        .filter(|c| c.label.to_lowercase().contains(&query))
        .collect()
}

/// Turn a backend hit into a Search-category command.
pub fn command_from_result(result: &SearchResult) -> Command {
    let href = if result.href.is_empty() {
        "/#contact".to_string()
    } else {
        result.href.clone()
    };
    Command {
        id: format!("search-{}", result.id),
        label: result.title.clone(),
        icon: icon_for_kind(&result.kind),
        action: CommandAction::Navigate(href),
        category: CommandCategory::Search,
        preview: (!result.preview.is_empty()).then(|| result.preview.clone()),
    }
}

fn icon_for_kind(kind: &str) -> &'static str {
    match kind {
        "project" => "▣",
        "skill" | "stack" => "≡",
        "experience" => "◷",
        _ => "·",
    }
}

/// Group commands by category in order of first appearance, keeping the
/// original order inside each group.
pub fn group_by_category<'a>(commands: &[&'a Command]) -> Vec<(CommandCategory, Vec<&'a Command>)> {
    let mut groups: Vec<(CommandCategory, Vec<&'a Command>)> = Vec::new();
    for &command in commands {
        match groups.iter_mut().find(|(category, _)| *category == command.category) {
            Some((_, members)) => members.push(command),
            None => groups.push((command.category, vec![command])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_ids_are_unique() {
        let commands = static_commands("http://localhost:8000");
        let mut ids: Vec<&str> = commands.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), commands.len());
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let commands = static_commands("http://localhost:8000");
        let hits = filter_commands(&commands, "GO TO");
        assert_eq!(hits.len(), 5);
        assert!(filter_commands(&commands, "zzz").is_empty());
        assert_eq!(filter_commands(&commands, "  ").len(), commands.len());
    }

    #[test]
    fn test_command_from_result() {
        let result = SearchResult {
            id: "p1".to_string(),
            kind: "project".to_string(),
            title: "Sentinel".to_string(),
            preview: "Monitoring".to_string(),
            href: "/#projects".to_string(),
            score: 0.8,
            url: None,
        };
        let command = command_from_result(&result);
        assert_eq!(command.category, CommandCategory::Search);
        assert_eq!(command.action, CommandAction::Navigate("/#projects".to_string()));
        assert_eq!(command.preview.as_deref(), Some("Monitoring"));
    }

    #[test]
    fn test_grouping_keeps_first_appearance_order() {
        let commands = static_commands("http://localhost:8000");
        let chat = commands.iter().find(|c| c.id == "action-chat").unwrap();
        let home = commands.iter().find(|c| c.id == "nav-home").unwrap();
        let email = commands.iter().find(|c| c.id == "action-email").unwrap();

        let groups = group_by_category(&[chat, home, email]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, CommandCategory::Actions);
        assert_eq!(groups[0].1, vec![chat, email]);
        assert_eq!(groups[1].1, vec![home]);
    }

    #[tokio::test]
    async fn test_perform_publishes_signal() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        CommandAction::OpenChat.perform(&bus);
        assert_eq!(rx.recv().await.unwrap(), UiSignal::OpenChat);
    }
}
