//! Integration tests for the turn controller.
//!
//! These drive whole turns through a deterministic stub gateway and the
//! in-memory session store.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chatrs_conversation::{ConversationConfig, TurnController, TurnError, TurnRequest};
use chatrs_core::{
    ChatMessage, FragmentStream, GatewayError, LLMProvider, LLMResponse, Prompt, Role, Session,
    SessionStorage, StoreError, TrimConfig,
};
use chatrs_session::MemorySessionStore;
use futures::{StreamExt, TryStreamExt};

/// Deterministic gateway: every message costs 10 tokens unless hinted, and
/// the reply is either fixed or an echo of the latest human message.
#[derive(Default)]
struct StubProvider {
    reply: Option<String>,
    delay: Duration,
    fail: AtomicBool,
    fail_mid_stream: bool,
    prompts: Mutex<Vec<Prompt>>,
}

impl StubProvider {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    fn echo() -> Self {
        Self::default()
    }

    fn failing() -> Self {
        let provider = Self::default();
        provider.fail.store(true, Ordering::SeqCst);
        provider
    }

    fn reply_for(&self, prompt: &Prompt) -> String {
        self.reply.clone().unwrap_or_else(|| {
            let latest = prompt
                .messages
                .iter()
                .rev()
                .find(|m| m.role() == Role::Human)
                .map_or("", ChatMessage::content);
            format!("echo: {latest}")
        })
    }

    async fn record(&self, prompt: &Prompt) -> Result<(), GatewayError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::RateLimited("slow down".to_string()));
        }
        Ok(())
    }

    fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LLMProvider for StubProvider {
    async fn complete(&self, prompt: &Prompt, _model: &str) -> Result<LLMResponse, GatewayError> {
        self.record(prompt).await?;
        Ok(LLMResponse {
            message: ChatMessage::assistant(self.reply_for(prompt)),
            usage: None,
        })
    }

    async fn stream(&self, prompt: &Prompt, _model: &str) -> Result<FragmentStream, GatewayError> {
        self.record(prompt).await?;

        let chars: Vec<char> = self.reply_for(prompt).chars().collect();
        let mut fragments: Vec<Result<String, GatewayError>> = chars
            .chunks(3)
            .map(|chunk| Ok(chunk.iter().collect()))
            .collect();

        if self.fail_mid_stream {
            fragments.truncate(1);
            fragments.push(Err(GatewayError::Network("connection reset".to_string())));
        }

        Ok(Box::pin(futures::stream::iter(fragments)))
    }

    fn get_default_model(&self) -> &str {
        "stub-model"
    }

    fn count_message_tokens(&self, message: &ChatMessage) -> usize {
        message.token_hint().unwrap_or(10)
    }
}

/// Store whose writes always fail.
struct BrokenStore;

#[async_trait]
impl SessionStorage for BrokenStore {
    async fn load(&self, id: Option<&str>) -> Result<Session, StoreError> {
        Ok(id.map_or_else(Session::ephemeral, Session::new))
    }

    async fn save(&self, _session: &Session) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }

    async fn clear_session(&self, _id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

type Controller = TurnController<Arc<StubProvider>, Arc<MemorySessionStore>>;

fn controller(
    provider: StubProvider,
    config: ConversationConfig,
) -> (Controller, Arc<StubProvider>, Arc<MemorySessionStore>) {
    let provider = Arc::new(provider);
    let store = Arc::new(MemorySessionStore::new());
    let controller = TurnController::new(Arc::clone(&provider), Arc::clone(&store), config);
    (controller, provider, store)
}

/// Seed `id` with `exchanges` human/assistant pairs.
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn seed(
    store: &MemorySessionStore,
    id: &str,
    head: Option<&str>,
    exchanges: usize,
) -> Session {
    let mut session = store.load(Some(id)).await.expect("load session");
    if let Some(system) = head {
        session.append(ChatMessage::system(system));
    }
    for i in 1..=exchanges {
        session.append(ChatMessage::human(format!("question {i}")));
        session.append(ChatMessage::assistant(format!("answer {i}")));
    }
    store.save(&session).await.expect("save session");
    session
}

fn contents(messages: &[ChatMessage]) -> Vec<&str> {
    messages.iter().map(ChatMessage::content).collect()
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_first_turn_on_empty_session() {
    let (controller, provider, store) =
        controller(StubProvider::replying("Hello!"), ConversationConfig::default());

    let reply = controller
        .run_turn(TurnRequest::new("Hi").with_language("English").with_session("t1"))
        .await
        .expect("run turn");

    assert_eq!(reply.role(), Role::Assistant);
    assert_eq!(reply.content(), "Hello!");

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 1);
    let wire = prompts[0].to_messages();
    assert_eq!(wire.len(), 2);
    assert_eq!(wire[0].role(), Role::System);
    assert!(wire[0].content().contains("English"));
    assert_eq!(wire[1], ChatMessage::human("Hi"));

    let session = store.load(Some("t1")).await.expect("load session");
    assert_eq!(contents(session.messages()), vec!["Hi", "Hello!"]);
    assert_eq!(
        session.messages().iter().map(ChatMessage::role).collect::<Vec<_>>(),
        vec![Role::Human, Role::Assistant]
    );
    assert_eq!(session.language(), Some("English"));
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_long_history_keeps_last_three() {
    let config =
        ConversationConfig::default().with_trim(TrimConfig::default().with_max_tokens(35));
    let (controller, provider, store) = controller(StubProvider::echo(), config);
    seed(&store, "long", None, 50).await;

    controller
        .run_turn(TurnRequest::new("question 51").with_session("long"))
        .await
        .expect("run turn");

    let prompts = provider.prompts();
    assert_eq!(
        contents(&prompts[0].messages),
        vec!["question 50", "answer 50", "question 51"]
    );

    let session = store.load(Some("long")).await.expect("load session");
    assert_eq!(session.message_count(), 102);
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_long_history_keeps_head_system_message() {
    let config =
        ConversationConfig::default().with_trim(TrimConfig::default().with_max_tokens(45));
    let (controller, provider, store) = controller(StubProvider::echo(), config);
    seed(&store, "long", Some("You are terse."), 50).await;

    controller
        .run_turn(TurnRequest::new("question 51").with_session("long"))
        .await
        .expect("run turn");

    let prompts = provider.prompts();
    assert_eq!(
        contents(&prompts[0].messages),
        vec!["You are terse.", "question 50", "answer 50", "question 51"]
    );
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_oversized_message_yields_empty_context() {
    let config = ConversationConfig::default().with_trim(TrimConfig::default().with_max_tokens(5));
    let (controller, provider, store) = controller(StubProvider::replying("ok"), config);

    let reply = controller
        .run_turn(TurnRequest::new("a message larger than the budget").with_session("big"))
        .await
        .expect("degenerate trim is not an error");

    assert_eq!(reply.content(), "ok");
    assert!(provider.prompts()[0].messages.is_empty());

    let session = store.load(Some("big")).await.expect("load session");
    assert_eq!(session.message_count(), 2);
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_gateway_failure_leaves_session_untouched() {
    let (controller, _provider, store) =
        controller(StubProvider::failing(), ConversationConfig::default());
    let before = seed(&store, "t1", None, 1).await;

    let result = controller
        .run_turn(TurnRequest::new("are you there?").with_session("t1"))
        .await;

    assert!(matches!(
        result,
        Err(TurnError::Gateway(GatewayError::RateLimited(_)))
    ));
    let after = store.load(Some("t1")).await.expect("load session");
    assert_eq!(after, before);

    let result = controller
        .run_turn(TurnRequest::new("hello?").with_session("new"))
        .await;
    assert!(result.is_err());
    assert_eq!(store.list_sessions().await.expect("list"), vec!["t1"]);
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_session_continues_after_failed_turn() {
    let (controller, provider, store) =
        controller(StubProvider::failing(), ConversationConfig::default());

    let failed = controller
        .run_turn(TurnRequest::new("first").with_session("t1"))
        .await;
    assert!(failed.is_err());

    provider.fail.store(false, Ordering::SeqCst);
    let reply = controller
        .run_turn(TurnRequest::new("second").with_session("t1"))
        .await
        .expect("run turn");
    assert_eq!(reply.content(), "echo: second");

    let session = store.load(Some("t1")).await.expect("load session");
    assert_eq!(contents(session.messages()), vec!["second", "echo: second"]);
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_concurrent_turns_on_same_session_are_serialized() {
    let provider = StubProvider {
        delay: Duration::from_millis(50),
        ..StubProvider::echo()
    };
    let (controller, provider, store) = controller(provider, ConversationConfig::default());

    let (first, second) = tokio::join!(
        controller.run_turn(TurnRequest::new("one").with_session("shared")),
        controller.run_turn(TurnRequest::new("two").with_session("shared")),
    );
    first.expect("first turn");
    second.expect("second turn");

    let session = store.load(Some("shared")).await.expect("load session");
    let log = session.messages();
    assert_eq!(log.len(), 4);
    for pair in log.chunks(2) {
        assert_eq!(pair[0].role(), Role::Human);
        assert_eq!(pair[1].role(), Role::Assistant);
        assert_eq!(pair[1].content(), format!("echo: {}", pair[0].content()));
    }

    // The later turn saw the earlier one's exchange.
    let prompts = provider.prompts();
    assert_eq!(prompts[0].messages.len(), 1);
    assert_eq!(prompts[1].messages.len(), 3);
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_concurrent_turns_on_different_sessions() {
    let provider = StubProvider {
        delay: Duration::from_millis(20),
        ..StubProvider::echo()
    };
    let (controller, _provider, store) = controller(provider, ConversationConfig::default());

    let (a, b) = tokio::join!(
        controller.run_turn(TurnRequest::new("from a").with_session("a")),
        controller.run_turn(TurnRequest::new("from b").with_session("b")),
    );
    assert_eq!(a.expect("turn a").content(), "echo: from a");
    assert_eq!(b.expect("turn b").content(), "echo: from b");
    assert_eq!(store.list_sessions().await.expect("list"), vec!["a", "b"]);
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_concurrent_streams_on_same_session_are_serialized() {
    let provider = StubProvider {
        delay: Duration::from_millis(50),
        ..StubProvider::echo()
    };
    let (controller, provider, store) = controller(provider, ConversationConfig::default());

    let (first, second) = tokio::join!(
        controller
            .stream_turn(TurnRequest::new("first question").with_session("shared"))
            .try_collect::<Vec<String>>(),
        controller
            .stream_turn(TurnRequest::new("second question").with_session("shared"))
            .try_collect::<Vec<String>>(),
    );
    let first = first.expect("first stream").concat();
    let second = second.expect("second stream").concat();

    let session = store.load(Some("shared")).await.expect("load session");
    let log = session.messages();
    assert_eq!(log.len(), 4);
    for pair in log.chunks(2) {
        assert_eq!(pair[0].role(), Role::Human);
        assert_eq!(pair[1].role(), Role::Assistant);
        assert_eq!(pair[1].content(), format!("echo: {}", pair[0].content()));
    }

    let mut replies = vec![log[1].content(), log[3].content()];
    replies.sort_unstable();
    let mut streamed = vec![first.as_str(), second.as_str()];
    streamed.sort_unstable();
    assert_eq!(replies, streamed);

    // The later turn saw the earlier one's exchange.
    let prompts = provider.prompts();
    assert_eq!(prompts[0].messages.len(), 1);
    assert_eq!(prompts[1].messages.len(), 3);
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_stream_matches_blocking_completion() {
    let (controller, _provider, store) =
        controller(StubProvider::echo(), ConversationConfig::default());

    let blocking = controller
        .run_turn(TurnRequest::new("tell me a story").with_session("blocking"))
        .await
        .expect("run turn");

    let fragments: Vec<String> = controller
        .stream_turn(TurnRequest::new("tell me a story").with_session("streaming"))
        .try_collect()
        .await
        .expect("stream turn");

    assert!(fragments.len() > 1);
    assert_eq!(fragments.concat(), blocking.content());

    let blocking_log = store.load(Some("blocking")).await.expect("load");
    let streaming_log = store.load(Some("streaming")).await.expect("load");
    assert_eq!(blocking_log.messages(), streaming_log.messages());
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_abandoned_stream_is_not_persisted() {
    let (controller, _provider, store) =
        controller(StubProvider::echo(), ConversationConfig::default());
    let before = seed(&store, "t1", None, 1).await;

    let mut stream = controller.stream_turn(TurnRequest::new("interrupt me").with_session("t1"));
    let first = stream.next().await.expect("first fragment").expect("fragment ok");
    assert_eq!(first, "ech");
    drop(stream);

    assert_eq!(store.load(Some("t1")).await.expect("load"), before);

    // The session lock was released with the stream.
    let reply = controller
        .run_turn(TurnRequest::new("again").with_session("t1"))
        .await
        .expect("run turn");
    assert_eq!(reply.content(), "echo: again");
    let session = store.load(Some("t1")).await.expect("load");
    assert_eq!(session.message_count(), 4);
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_stream_failure_midway_is_not_persisted() {
    let provider = StubProvider {
        fail_mid_stream: true,
        ..StubProvider::echo()
    };
    let (controller, _provider, store) = controller(provider, ConversationConfig::default());

    let items: Vec<Result<String, TurnError>> = controller
        .stream_turn(TurnRequest::new("hello").with_session("t1"))
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(matches!(
        items[1],
        Err(TurnError::Gateway(GatewayError::Network(_)))
    ));
    assert!(store.list_sessions().await.expect("list").is_empty());
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_ephemeral_turn_is_not_stored() {
    let (controller, provider, store) =
        controller(StubProvider::echo(), ConversationConfig::default());

    let reply = controller
        .run_turn(TurnRequest::new("who am I?"))
        .await
        .expect("run turn");
    assert_eq!(reply.content(), "echo: who am I?");

    // A second ephemeral turn starts from nothing.
    controller
        .run_turn(TurnRequest::new("still there?"))
        .await
        .expect("run turn");
    assert_eq!(provider.prompts()[1].messages.len(), 1);
    assert!(store.list_sessions().await.expect("list").is_empty());
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_omitted_language_falls_back_to_default() {
    let (controller, provider, store) =
        controller(StubProvider::echo(), ConversationConfig::default());

    for request in [
        TurnRequest::new("bonjour").with_language("French"),
        TurnRequest::new("hello"),
        TurnRequest::new("hallo").with_language("German"),
    ] {
        controller
            .run_turn(request.with_session("lang"))
            .await
            .expect("run turn");
    }

    let directives: Vec<String> = provider
        .prompts()
        .into_iter()
        .map(|p| p.system_directive)
        .collect();
    assert!(directives[0].ends_with("in French."));
    assert!(directives[1].ends_with("in English."));
    assert!(directives[2].ends_with("in German."));

    // The session records the language of the latest turn.
    let session = store.load(Some("lang")).await.expect("load");
    assert_eq!(session.language(), Some("German"));

    controller
        .run_turn(TurnRequest::new("again").with_session("lang"))
        .await
        .expect("run turn");
    let session = store.load(Some("lang")).await.expect("load");
    assert_eq!(session.language(), Some("English"));
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_default_language_applies() {
    let config = ConversationConfig::default().with_default_language("Portuguese".to_string());
    let (controller, provider, _store) = controller(StubProvider::echo(), config);

    controller
        .run_turn(TurnRequest::new("oi"))
        .await
        .expect("run turn");
    assert!(provider.prompts()[0].system_directive.ends_with("in Portuguese."));
}

#[tokio::test]
#[expect(clippy::expect_used, reason = "Test failure should panic with context")]
async fn test_system_prompt_seeds_new_sessions() {
    let config =
        ConversationConfig::default().with_system_prompt(Some("Always be polite.".to_string()));
    let (controller, provider, store) = controller(StubProvider::echo(), config);

    controller
        .run_turn(TurnRequest::new("hi").with_session("seeded"))
        .await
        .expect("run turn");
    controller
        .run_turn(TurnRequest::new("bye").with_session("seeded"))
        .await
        .expect("run turn");

    let session = store.load(Some("seeded")).await.expect("load");
    assert_eq!(
        contents(session.messages()),
        vec!["Always be polite.", "hi", "echo: hi", "bye", "echo: bye"]
    );
    assert_eq!(
        contents(&provider.prompts()[1].messages),
        vec!["Always be polite.", "hi", "echo: hi", "bye"]
    );
}

#[tokio::test]
async fn test_store_failure_is_reported() {
    let controller = TurnController::new(
        StubProvider::echo(),
        BrokenStore,
        ConversationConfig::default(),
    );

    let result = controller
        .run_turn(TurnRequest::new("hi").with_session("t1"))
        .await;
    assert!(matches!(result, Err(TurnError::Store(StoreError::Backend(_)))));

    let streamed: Vec<Result<String, TurnError>> = controller
        .stream_turn(TurnRequest::new("hi").with_session("t1"))
        .collect()
        .await;
    assert!(matches!(
        streamed.last(),
        Some(Err(TurnError::Store(StoreError::Backend(_))))
    ));
}
