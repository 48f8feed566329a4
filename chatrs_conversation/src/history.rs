//! Conversation history trimming.
//!
//! Reduces a message log to a token budget while keeping suffix order and
//! valid turn-taking.

use chatrs_core::{ChatMessage, Role, TrimConfig, TrimStrategy};
use tracing::{debug, warn};

/// Token-budgeted history selection.
///
/// The trimmer does not know how to count tokens; the caller passes the
/// model gateway's counter to [`HistoryTrimmer::trim`].
#[derive(Debug, Clone, Default)]
pub struct HistoryTrimmer {
    config: TrimConfig,
}

impl HistoryTrimmer {
    #[must_use]
    pub const fn new(config: TrimConfig) -> Self {
        Self { config }
    }

    /// Select the messages that fit the budget.
    ///
    /// The result is a prefix-trimmed copy of `messages`, optionally preceded
    /// by a reserved head system message. A budget too small for any message
    /// yields an empty (or system-only) result rather than an error.
    pub fn trim<F>(&self, messages: &[ChatMessage], count: F) -> Vec<ChatMessage>
    where
        F: Fn(&ChatMessage) -> usize,
    {
        let (system, rest) = match messages.split_first() {
            Some((first, rest)) if self.config.include_system && first.role() == Role::System => {
                (Some(first), rest)
            }
            _ => (None, messages),
        };

        let budget = self
            .config
            .max_tokens
            .saturating_sub(system.map_or(0, &count));

        let mut kept = match self.config.strategy {
            TrimStrategy::Last => self.keep_last(rest, budget, &count),
        };

        if let Some(role) = self.config.start_on {
            let first = kept
                .iter()
                .position(|m| m.role() == role)
                .unwrap_or(kept.len());
            kept.drain(..first);
        }

        if kept.is_empty() && !rest.is_empty() {
            warn!(
                "History trimmed to nothing: {} messages, budget {} tokens",
                rest.len(),
                self.config.max_tokens
            );
        } else {
            debug!(
                "Trimmed history from {} to {} messages",
                rest.len(),
                kept.len()
            );
        }

        system.cloned().into_iter().chain(kept).collect()
    }

    /// Walk backwards from the newest message, keeping whole messages while
    /// they fit.
    fn keep_last<F>(
        &self,
        messages: &[ChatMessage],
        mut budget: usize,
        count: &F,
    ) -> Vec<ChatMessage>
    where
        F: Fn(&ChatMessage) -> usize,
    {
        let mut start = messages.len();
        let mut partial = None;

        for (idx, message) in messages.iter().enumerate().rev() {
            let tokens = count(message);
            if tokens > budget {
                if self.config.allow_partial {
                    partial = Self::partial_suffix(message, budget, count);
                }
                break;
            }
            budget -= tokens;
            start = idx;
        }

        partial
            .into_iter()
            .chain(messages[start..].iter().cloned())
            .collect()
    }

    /// Longest content suffix of `message` that fits `budget`, if any.
    fn partial_suffix<F>(message: &ChatMessage, budget: usize, count: &F) -> Option<ChatMessage>
    where
        F: Fn(&ChatMessage) -> usize,
    {
        let boundaries: Vec<usize> = message.content().char_indices().map(|(i, _)| i).collect();
        let suffix = |chars: usize| {
            let start = boundaries
                .get(boundaries.len() - chars)
                .copied()
                .unwrap_or(message.content().len());
            ChatMessage::new(message.role(), message.content()[start..].trim_start())
        };

        // Binary search on the number of trailing characters kept.
        let (mut lo, mut hi) = (0, boundaries.len());
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if count(&suffix(mid)) <= budget {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        (lo > 0).then(|| suffix(lo))
    }
}
