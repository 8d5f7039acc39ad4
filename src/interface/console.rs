use crate::{
    bus::Event,
    chat::{ChatMessage, ChatSession},
    entity::{Helpfulness, IssueCategory, Sender},
    error::SupportError,
    manager::SupportChat,
    transition::ChatState,
};
use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

const HELP: &str = "\
Commands:
  /open                 show the support chat
  /close                hide the support chat (the conversation is kept)
  /category <name>      open a ticket: billing, gameplay, technical or other
  /agent                ask for a live agent (after two messages)
  /helpful <n>          mark support reply number n as helpful
  /unhelpful <n>        mark support reply number n as not helpful
  /quick [n]            list quick replies, or send quick reply n
  /status               print the current session
  /reset                start over with a new ticket
  /help                 display this text
  /quit                 leave
Anything else is sent as a message.";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Open,
    Close,
    Category(IssueCategory),
    Agent,
    Rate { number: usize, helpful: bool },
    Quick(Option<usize>),
    Status,
    Reset,
    Help,
    Quit,
    Say(String),
}

impl Command {
    fn parse(line: &str) -> anyhow::Result<Self> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Command::Say(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let cmd = match name.to_ascii_lowercase().as_str() {
            "open" => Command::Open,
            "close" => Command::Close,
            "category" => Command::Category(arg.parse()?),
            "agent" => Command::Agent,
            "helpful" => Command::Rate {
                number: parse_number(arg)?,
                helpful: true,
            },
            "unhelpful" => Command::Rate {
                number: parse_number(arg)?,
                helpful: false,
            },
            "quick" if arg.is_empty() => Command::Quick(None),
            "quick" => Command::Quick(Some(parse_number(arg)?)),
            "status" => Command::Status,
            "reset" => Command::Reset,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => bail!("Unknown command /{}. Use /help to see what I can do.", other),
        };
        Ok(cmd)
    }
}

fn parse_number(arg: &str) -> anyhow::Result<usize> {
    let n: usize = arg
        .parse()
        .with_context(|| format!("Expected a number, got '{}'", arg))?;
    if n == 0 {
        bail!("Numbers start at 1");
    }
    Ok(n)
}

/// Render one message line; `number` is its 1-based position in the conversation.
fn render_message(number: usize, msg: &ChatMessage) -> String {
    let time = msg.sent_at().format("%H:%M:%S");
    let rating = match msg.helpfulness() {
        Helpfulness::Unset => "",
        Helpfulness::Helpful => " [helpful]",
        Helpfulness::Unhelpful => " [not helpful]",
    };
    match msg.sender() {
        Sender::Notice => format!("{:>3} {} -- {}{}", number, time, msg.body(), rating),
        _ => format!("{:>3} {} {}: {}{}", number, time, msg.sender(), msg.body(), rating),
    }
}

fn render_status(session: &ChatSession) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Chat is {} ({})\n",
        if session.is_open() { "open" } else { "closed" },
        ChatState::of(session)
    ));
    match (session.ticket_id(), session.selected_category()) {
        (Some(ticket_id), Some(category)) => {
            out.push_str(&format!("Ticket {} ({} support)\n", ticket_id, category));
        }
        _ => out.push_str("No ticket yet. Pick a category with /category <name>.\n"),
    }
    if let Some(target) = session.target_resolution_time() {
        out.push_str(&format!(
            "Target resolution: {}\n",
            target.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    out.push_str(&format!(
        "Messages sent: {}{}\n",
        session.interaction_count(),
        if session.escalation_eligible() && ChatState::of(session) == ChatState::Conversing {
            " (use /agent to reach a live agent)"
        } else {
            ""
        }
    ));
    for (i, msg) in session.messages().iter().enumerate() {
        out.push_str(&render_message(i + 1, msg));
        out.push('\n');
    }
    out
}

/// Terminal front end for the support chat.
#[derive(Clone)]
pub struct ConsoleInterface {
    chat: SupportChat,
}

impl ConsoleInterface {
    pub fn new(chat: SupportChat) -> Self {
        Self { chat }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        // Render appended messages as they arrive, including delayed scripted replies
        let mut rx = self.chat.subscribe();
        let chat = self.chat.clone();
        let renderer = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(Event::MessageAppended(msg)) => {
                        let session = chat.snapshot();
                        if !session.is_open() {
                            continue;
                        }
                        let number = session
                            .messages()
                            .iter()
                            .position(|m| m.id() == msg.id())
                            .map(|i| i + 1)
                            .unwrap_or(session.messages().len());
                        println!("{}", render_message(number, &msg));
                    }
                    Ok(Event::SessionUpdated(_)) => {}
                    Err(RecvError::Lagged(n)) => warn!("Console view skipped {} events", n),
                    Err(RecvError::Closed) => break,
                }
            }
        });

        println!("Welcome to support! Type /open to start, /help for commands.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
            if line.trim().is_empty() {
                continue;
            }
            match Command::parse(&line) {
                Ok(Command::Quit) => break,
                Ok(cmd) => {
                    if let Err(e) = self.handle(cmd) {
                        println!("! {}", e);
                    }
                }
                Err(e) => println!("! {}", e),
            }
        }

        renderer.abort();
        info!("Console closed");
        Ok(())
    }

    fn handle(&self, cmd: Command) -> anyhow::Result<()> {
        debug!("Console command: {:?}", cmd);
        match cmd {
            Command::Open => {
                self.chat.set_open(true);
                print!("{}", render_status(&self.chat.snapshot()));
            }
            Command::Close => {
                self.chat.set_open(false);
                println!("Chat hidden. Your conversation is kept; /open to come back.");
            }
            Command::Category(category) => {
                self.require_open()?;
                self.chat.select_category(category)?;
            }
            Command::Agent => {
                self.require_open()?;
                self.chat.request_live_agent()?;
            }
            Command::Rate { number, helpful } => {
                self.require_open()?;
                let message_id = self
                    .chat
                    .snapshot()
                    .messages()
                    .get(number - 1)
                    .map(|m| m.id().to_string())
                    .ok_or_else(|| SupportError::MessageNotFound(format!("#{}", number)))?;
                self.chat.mark_helpful(&message_id, helpful)?;
                println!("Thanks for the feedback!");
            }
            Command::Quick(None) => {
                for (i, reply) in self.chat.quick_replies().iter().enumerate() {
                    println!("{:>3} {}", i + 1, reply);
                }
            }
            Command::Quick(Some(number)) => {
                self.require_open()?;
                self.chat
                    .send_quick_reply(number - 1)
                    .map_err(|e| match e {
                        SupportError::QuickReplyNotFound(_) => {
                            SupportError::QuickReplyNotFound(number)
                        }
                        other => other,
                    })?;
            }
            Command::Status => print!("{}", render_status(&self.chat.snapshot())),
            Command::Reset => {
                self.chat.reset();
                println!("Started over. Pick a category with /category <name>.");
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
            Command::Say(text) => {
                self.require_open()?;
                self.chat.send_message(&text)?;
            }
        }
        Ok(())
    }

    fn require_open(&self) -> anyhow::Result<()> {
        if !self.chat.snapshot().is_open() {
            bail!("The chat is closed. Use /open first.");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::config::SupportConfig;
    use std::sync::Arc;

    fn console() -> ConsoleInterface {
        ConsoleInterface::new(SupportChat::new(
            Arc::new(EventBus::new()),
            SupportConfig::default(),
        ))
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/open").unwrap(), Command::Open);
        assert_eq!(
            Command::parse("/category Billing").unwrap(),
            Command::Category(IssueCategory::Billing)
        );
        assert_eq!(
            Command::parse("/unhelpful 3").unwrap(),
            Command::Rate {
                number: 3,
                helpful: false
            }
        );
        assert_eq!(Command::parse("/quick").unwrap(), Command::Quick(None));
        assert_eq!(Command::parse("/quick 2").unwrap(), Command::Quick(Some(2)));
        assert_eq!(Command::parse("/EXIT").unwrap(), Command::Quit);
        assert_eq!(
            Command::parse("  my deposit is missing ").unwrap(),
            Command::Say("my deposit is missing".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Command::parse("/category refunds").is_err());
        assert!(Command::parse("/helpful").is_err());
        assert!(Command::parse("/helpful 0").is_err());
        assert!(Command::parse("/dance").is_err());
    }

    #[test]
    fn test_render_notice_and_rating() {
        let notice = ChatMessage::new(Sender::Notice, "Ticket TKT-AAAAAA created for billing support.");
        let line = render_message(1, &notice);
        assert!(line.contains("-- Ticket TKT-AAAAAA"));

        let mut reply = ChatMessage::new(Sender::Bot, "On it");
        reply.helpfulness = Helpfulness::Helpful;
        let line = render_message(12, &reply);
        assert!(line.starts_with(" 12 "));
        assert!(line.contains("Support: On it [helpful]"));
    }

    #[test]
    fn test_status_without_ticket() {
        let status = render_status(&ChatSession::new());
        assert!(status.contains("Chat is closed"));
        assert!(status.contains("No ticket yet"));
    }

    #[tokio::test]
    async fn test_commands_require_open_chat() {
        let console = console();
        let err = console
            .handle(Command::Category(IssueCategory::Gameplay))
            .unwrap_err();
        assert!(err.to_string().contains("/open"));
        assert!(console.chat.snapshot().selected_category.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_drives_conversation() {
        let console = console();
        console.handle(Command::Open).unwrap();
        console
            .handle(Command::Category(IssueCategory::Technical))
            .unwrap();
        console.handle(Command::Say("it crashed".to_string())).unwrap();
        console.handle(Command::Quick(Some(3))).unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        console.handle(Command::Agent).unwrap();

        let session = console.chat.snapshot();
        assert_eq!(session.interaction_count, 2);
        assert!(session.live_agent_requested);
        assert_eq!(session.messages[2].body, "Got it");

        // message 4 is the first scripted acknowledgment
        console
            .handle(Command::Rate {
                number: 4,
                helpful: true,
            })
            .unwrap();
        assert_eq!(
            console.chat.snapshot().messages[3].helpfulness,
            Helpfulness::Helpful
        );

        let err = console.handle(Command::Quick(Some(9))).unwrap_err();
        assert!(err.to_string().contains('9'));
    }
}
