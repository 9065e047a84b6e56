//! Line-oriented interactive shell.
//!
//! Reads one command per line and writes a reply per command. Commands run
//! one at a time, so a second generation cannot start while one is in
//! flight. No error ends the loop; only `quit` or end of input does.

use crate::controller::GenerationController;
use crate::error::PromptPixError;
use crate::image::GenerationResult;
use crate::persistence::PersistenceGateway;
use crate::session::{Credentials, SessionAdapter};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

const PROMPT: &str = "promptpix> ";

const HELP: &str = "\
Commands:
  signup <email> <password>   Create an account
  signin <email> <password>   Sign in
  signout                     Sign out
  whoami                      Show the signed-in user
  generate <prompt>           Generate an image and record it
  history                     List your generated images
  help                        Show this help
  quit                        Leave the shell";

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create an account.
    SignUp(String, String),
    /// Sign in with email and password.
    SignIn(String, String),
    /// Sign out.
    SignOut,
    /// Show the signed-in user.
    WhoAmI,
    /// Generate an image from the rest of the line.
    Generate(String),
    /// List the signed-in user's records.
    History,
    /// Show usage.
    Help,
    /// Leave the shell.
    Quit,
}

impl Command {
    /// Parses one input line. Returns a usage message on malformed input.
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_ascii_lowercase().as_str() {
            "signup" | "signin" => {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(email), Some(password), None) => {
                        let (email, password) = (email.to_string(), password.to_string());
                        if verb.eq_ignore_ascii_case("signup") {
                            Ok(Self::SignUp(email, password))
                        } else {
                            Ok(Self::SignIn(email, password))
                        }
                    }
                    _ => Err(format!("usage: {} <email> <password>", verb.to_ascii_lowercase())),
                }
            }
            "signout" => Ok(Self::SignOut),
            "whoami" => Ok(Self::WhoAmI),
            // Emptiness is the controller's call.
            "generate" => Ok(Self::Generate(rest.to_string())),
            "history" => Ok(Self::History),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command '{other}', type 'help'")),
        }
    }
}

/// What the loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Print the text and read the next line.
    Text(String),
    /// Stop reading.
    Quit,
}

/// Interactive front end over the controller, gateway and session adapter.
pub struct Shell {
    controller: GenerationController,
    gateway: PersistenceGateway,
    sessions: SessionAdapter,
    output_dir: PathBuf,
}

impl Shell {
    /// Creates a shell that writes generated images under `output_dir`.
    pub fn new(
        controller: GenerationController,
        gateway: PersistenceGateway,
        sessions: SessionAdapter,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            controller,
            gateway,
            sessions,
            output_dir: output_dir.into(),
        }
    }

    /// Runs the shell on stdin and stdout.
    pub async fn run(&self) -> io::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.run_with(stdin, stdout).await
    }

    /// Runs the shell over arbitrary line input and output.
    pub async fn run_with<R, W>(&self, input: R, mut output: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                output.write_all(PROMPT.as_bytes()).await?;
                output.flush().await?;
                continue;
            }

            match self.handle_line(&line).await {
                Reply::Quit => break,
                Reply::Text(text) => {
                    output.write_all(text.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                }
            }
            output.write_all(PROMPT.as_bytes()).await?;
            output.flush().await?;
        }

        output.flush().await
    }

    /// Parses and executes one line.
    pub async fn handle_line(&self, line: &str) -> Reply {
        match Command::parse(line) {
            Ok(command) => self.execute(command).await,
            Err(usage) => Reply::Text(usage),
        }
    }

    /// Executes one command.
    pub async fn execute(&self, command: Command) -> Reply {
        let text = match command {
            Command::Quit => return Reply::Quit,
            Command::Help => HELP.to_string(),
            Command::SignUp(email, password) => {
                let credentials = Credentials::new(email, password);
                match self.sessions.sign_up(&credentials).await {
                    Ok(session) => match session.identity() {
                        Some(identity) => {
                            format!("Account created. Signed in as {}.", display_name(identity))
                        }
                        None => {
                            "Account created. Check your email to confirm it, then sign in.".into()
                        }
                    },
                    Err(e) => e.user_message(),
                }
            }
            Command::SignIn(email, password) => {
                let credentials = Credentials::new(email, password);
                match self.sessions.sign_in(&credentials).await {
                    Ok(session) => match session.identity() {
                        Some(identity) => format!("Signed in as {}.", display_name(identity)),
                        None => PromptPixError::NoSession.user_message(),
                    },
                    Err(e) => e.user_message(),
                }
            }
            Command::SignOut => {
                self.sessions.sign_out().await;
                "Signed out.".into()
            }
            Command::WhoAmI => match self.sessions.current().identity() {
                Some(identity) => format!("Signed in as {}.", display_name(identity)),
                None => "Not signed in.".into(),
            },
            Command::Generate(prompt) => self.generate(&prompt).await,
            Command::History => self.history().await,
        };
        Reply::Text(text)
    }

    async fn generate(&self, prompt: &str) -> String {
        let session = self.sessions.current();
        let result = match self.controller.generate(prompt, &session).await {
            Ok(result) => result,
            Err(e) => return e.user_message(),
        };

        // The record and the file are independent; either failing is a warning.
        let saved = self.gateway.save(&session, &result).await;
        let written = write_image(&self.output_dir, &result);

        let mut text = match &written {
            Ok(path) => format!(
                "Saved {} ({} bytes, {} attempt(s)).",
                path.display(),
                result.image.size(),
                result.image.metadata.attempts
            ),
            Err(_) => format!(
                "Generated image ({} bytes, {} attempt(s)).",
                result.image.size(),
                result.image.metadata.attempts
            ),
        };
        if let Err(e) = &written {
            text.push_str(&format!("\nWarning: {}", e.user_message()));
        }
        if let Err(e) = &saved {
            text.push_str(&format!("\nWarning: {}", e.user_message()));
        }
        text
    }

    async fn history(&self) -> String {
        let session = self.sessions.current();
        match self.gateway.list_for_owner(&session).await {
            Ok(records) if records.is_empty() => "No images yet.".into(),
            Ok(records) => records
                .iter()
                .map(|r| {
                    format!(
                        "#{:<4} {}  {}",
                        r.id.0,
                        r.created_at.format("%Y-%m-%d %H:%M:%S"),
                        r.prompt
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => e.user_message(),
        }
    }
}

fn display_name(identity: &crate::session::Identity) -> &str {
    identity
        .email
        .as_deref()
        .unwrap_or_else(|| identity.user_id.as_str())
}

/// Writes the image under `dir` with a timestamped name and returns the path.
pub fn write_image(dir: &Path, result: &GenerationResult) -> crate::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let name = format!(
        "promptpix-{}.{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f"),
        result.image.format.extension()
    );
    let path = dir.join(name);
    result.image.save(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Sleeper;
    use crate::error::Result;
    use crate::image::{
        GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat, ImageProvider,
    };
    use crate::persistence::{ImageRecord, NewImageRecord, RecordStore, SqliteRecordStore};
    use crate::session::{Identity, IdentityProvider, UserId};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    const PNG: [u8; 16] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, 0x49, 0x48, 0x44, 0x52,
    ];

    struct PngProvider;

    #[async_trait]
    impl ImageProvider for PngProvider {
        async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
            Ok(GeneratedImage::new(
                PNG.to_vec(),
                ImageFormat::Png,
                GenerationMetadata {
                    attempts: request.attempt + 1,
                    ..Default::default()
                },
            ))
        }

        fn name(&self) -> &str {
            "png"
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NoWait;

    #[async_trait]
    impl Sleeper for NoWait {
        async fn sleep(&self, _duration: Duration) {}
    }

    struct Accounts;

    #[async_trait]
    impl IdentityProvider for Accounts {
        async fn sign_up(&self, _credentials: &Credentials) -> Result<Option<Identity>> {
            Ok(None)
        }

        async fn sign_in(&self, credentials: &Credentials) -> Result<Identity> {
            if credentials.password != "secret" {
                return Err(PromptPixError::Auth("Invalid login credentials".into()));
            }
            Ok(Identity {
                user_id: UserId::new(format!("user-{}", credentials.email)),
                email: Some(credentials.email.clone()),
                access_token: "token".into(),
            })
        }

        async fn sign_out(&self, _identity: &Identity) -> Result<()> {
            Ok(())
        }

        async fn current_user(&self, _access_token: &str) -> Result<Identity> {
            Err(PromptPixError::Auth("unused".into()))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn insert(&self, _record: NewImageRecord) -> Result<ImageRecord> {
            Err(PromptPixError::Store("database is locked".into()))
        }

        async fn list_by_owner(&self, _owner_id: &UserId) -> Result<Vec<ImageRecord>> {
            Ok(Vec::new())
        }

        async fn health_check(&self) -> Result<()> {
            Err(PromptPixError::Store("database is locked".into()))
        }
    }

    fn shell_with_store(output_dir: &Path, store: Arc<dyn RecordStore>) -> Shell {
        let controller = GenerationController::builder(Arc::new(PngProvider))
            .sleeper(Arc::new(NoWait))
            .build();
        let gateway = PersistenceGateway::new(store);
        let sessions = SessionAdapter::new(Arc::new(Accounts));
        Shell::new(controller, gateway, sessions, output_dir)
    }

    async fn shell(output_dir: &Path) -> Shell {
        let store = SqliteRecordStore::connect("sqlite::memory:")
            .await
            .expect("memory store");
        shell_with_store(output_dir, Arc::new(store))
    }

    fn text(reply: Reply) -> String {
        match reply {
            Reply::Text(text) => text,
            Reply::Quit => panic!("unexpected quit"),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse("signin a@b.c pw"),
            Ok(Command::SignIn("a@b.c".into(), "pw".into()))
        );
        assert_eq!(
            Command::parse("  generate a red fox in snow "),
            Ok(Command::Generate("a red fox in snow".into()))
        );
        assert_eq!(Command::parse("generate"), Ok(Command::Generate(String::new())));
        assert_eq!(Command::parse("QUIT"), Ok(Command::Quit));
        assert!(Command::parse("signin only-email").is_err());
        assert!(Command::parse("dance").is_err());
    }

    #[tokio::test]
    async fn test_generate_requires_sign_in() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = shell(dir.path()).await;

        let reply = text(shell.handle_line("generate a red fox").await);
        assert_eq!(reply, PromptPixError::NoSession.user_message());
        assert_eq!(std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0), 0);
    }

    #[tokio::test]
    async fn test_generate_writes_file_and_records_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = shell(dir.path()).await;

        let reply = text(shell.handle_line("signin fox@example.com secret").await);
        assert_eq!(reply, "Signed in as fox@example.com.");

        let reply = text(shell.handle_line("generate a red fox").await);
        assert!(reply.starts_with("Saved "), "{reply}");
        assert!(!reply.contains("Warning"));
        assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 1);

        let history = text(shell.handle_line("history").await);
        assert!(history.contains("a red fox"));
        assert!(!history.contains("highly detailed"));
    }

    #[tokio::test]
    async fn test_store_failure_is_a_warning_after_the_image_is_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = shell_with_store(dir.path(), Arc::new(BrokenStore));
        shell.handle_line("signin fox@example.com secret").await;

        let reply = text(shell.handle_line("generate a red fox").await);
        assert!(reply.starts_with("Saved "), "{reply}");
        assert!(reply.contains("Warning: Could not save to history: database is locked"));
        assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 1);

        // The shell keeps going.
        assert_eq!(
            text(shell.handle_line("whoami").await),
            "Signed in as fox@example.com."
        );
    }

    #[tokio::test]
    async fn test_unwritable_output_dir_still_records_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"occupied").expect("write file");
        let shell = shell(&blocker).await;
        shell.handle_line("signin fox@example.com secret").await;

        let reply = text(shell.handle_line("generate a red fox").await);
        assert!(reply.starts_with("Generated image"), "{reply}");
        assert!(reply.contains("Warning: File error"), "{reply}");
        assert!(!reply.contains("Could not save to history"));

        let history = text(shell.handle_line("history").await);
        assert!(history.contains("a red fox"), "{history}");
    }

    #[tokio::test]
    async fn test_empty_prompt_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = shell(dir.path()).await;
        shell.handle_line("signin fox@example.com secret").await;

        let reply = text(shell.handle_line("generate    ").await);
        assert_eq!(reply, PromptPixError::EmptyPrompt.user_message());
    }

    #[tokio::test]
    async fn test_auth_failure_keeps_shell_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = shell(dir.path()).await;

        let input = b"signin fox@example.com wrong\nwhoami\nsignup new@example.com pw\nquit\nwhoami\n";
        let mut output = Vec::new();
        shell
            .run_with(&input[..], &mut output)
            .await
            .expect("run");

        let output = String::from_utf8(output).expect("utf8");
        assert!(output.contains("Sign-in failed: Invalid login credentials"));
        assert!(output.contains("Not signed in."));
        assert!(output.contains("Check your email"));
        // Nothing after quit is processed.
        assert_eq!(output.matches("Not signed in.").count(), 1);
    }

    #[tokio::test]
    async fn test_sign_out_clears_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shell = shell(dir.path()).await;
        shell.handle_line("signin fox@example.com secret").await;

        assert_eq!(text(shell.handle_line("signout").await), "Signed out.");
        assert_eq!(text(shell.handle_line("whoami").await), "Not signed in.");
        assert_eq!(
            text(shell.handle_line("history").await),
            PromptPixError::NoSession.user_message()
        );
    }
}
