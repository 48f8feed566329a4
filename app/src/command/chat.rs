//! Multi-turn conversation command.
//!
//! With a session id the conversation is stored and continues across runs;
//! without one every turn is answered on its own.

use std::io::Write;

use chatrs_conversation::{TurnController, TurnRequest};
use chatrs_core::{LLMProvider, SessionStorage};
use futures::StreamExt;
use tracing::info;

use super::{build_conversation_config, init_common_components};

/// Input parameters for the Chat command strategy.
#[derive(Debug, Clone)]
pub struct ChatInput {
    /// Session to continue (ephemeral when absent)
    pub session_id: Option<String>,
    /// Preferred response language
    pub language: Option<String>,
    /// Print fragments as they arrive
    pub stream: bool,
    /// Optional single message to send (non-interactive mode)
    pub message: Option<String>,
    /// Optional model override
    pub model: Option<String>,
}

/// Strategy for executing the Chat command.
#[derive(Debug, Clone, Copy)]
pub struct ChatStrategy;

impl super::CommandStrategy for ChatStrategy {
    type Input = ChatInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let common = init_common_components().await?;
        let conversation_config = build_conversation_config(
            &common.config,
            common.provider.get_default_model(),
            input.model,
        );

        let controller = TurnController::new(common.provider, common.storage, conversation_config);
        let chat = Chat {
            controller: &controller,
            session_id: input.session_id,
            language: input.language,
            stream: input.stream,
        };

        if let Some(msg) = input.message {
            chat.send(&msg).await
        } else {
            chat.run_interactive().await
        }
    }
}

struct Chat<'a, P, S>
where
    P: LLMProvider,
    S: SessionStorage,
{
    controller: &'a TurnController<P, S>,
    session_id: Option<String>,
    language: Option<String>,
    stream: bool,
}

impl<P, S> Chat<'_, P, S>
where
    P: LLMProvider,
    S: SessionStorage,
{
    fn request(&self, text: &str) -> TurnRequest {
        let mut request = TurnRequest::new(text);
        if let Some(language) = &self.language {
            request = request.with_language(language.clone());
        }
        if let Some(id) = &self.session_id {
            request = request.with_session(id.clone());
        }
        request
    }

    /// Run one turn and print the reply.
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        if !self.stream {
            let reply = self.controller.run_turn(self.request(text)).await?;
            println!("{}", reply.content());
            return Ok(());
        }

        let mut stdout = std::io::stdout();
        let mut fragments = self.controller.stream_turn(self.request(text));
        while let Some(fragment) = fragments.next().await {
            print!("{}", fragment?);
            stdout.flush()?;
        }
        println!();
        Ok(())
    }

    async fn run_interactive(&self) -> anyhow::Result<()> {
        match &self.session_id {
            Some(id) => println!("=== Conversation Session: {id} ==="),
            None => println!("=== Ephemeral conversation (no history kept) ==="),
        }
        println!("Type 'exit' or 'quit' to end the session.");

        loop {
            print!("\nYou: ");
            std::io::stdout().flush()?;

            let mut input = String::new();
            if std::io::stdin().read_line(&mut input)? == 0 {
                break;
            }
            let input = input.trim();

            if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
                println!("Goodbye!");
                break;
            }
            if input.is_empty() {
                continue;
            }

            print!("\nAI: ");
            if let Err(e) = self.send(input).await {
                println!();
                eprintln!("Error: {e}");
            }
        }

        info!("Conversation ended");
        Ok(())
    }
}
