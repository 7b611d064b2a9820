//! Chat controller tying the composer, the exchange driver and the
//! transcript to the backend collaborators.

use std::sync::Arc;

use lumen_ai::{ChatTransport, MemoryStore, PersonaDirectory, PersonaListing, PersonaSummary};
use tracing::{info, warn};

use crate::{
    composer::Composer,
    error::SessionError,
    exchange::{run_exchange, ExchangeOutcome},
    render::{MarkupRenderer, Renderer},
    transcript::{EntryId, MessageRecord, Transcript},
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Transcript entries created by one submit and how the exchange ended.
pub struct ExchangeReport {
    pub user_entry: EntryId,
    pub assistant_entry: EntryId,
    pub outcome: ExchangeOutcome,
    /// Entries that received their server timestamp during this exchange.
    pub reconciled: Vec<EntryId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Empty text and no pending images; nothing was sent.
    Skipped,
    Exchanged(ExchangeReport),
}

/// Re-enables the composer when the exchange ends, including when the
/// submit future is dropped part way through.
struct BusyGuard<'a> {
    composer: &'a mut Composer,
}

impl<'a> BusyGuard<'a> {
    fn engage(composer: &'a mut Composer) -> Self {
        composer.set_enabled(false);
        Self { composer }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.composer.set_enabled(true);
    }
}

pub struct ChatController {
    transport: Arc<dyn ChatTransport>,
    memory: Arc<dyn MemoryStore>,
    personas: Arc<dyn PersonaDirectory>,
    markup: Option<Arc<dyn MarkupRenderer>>,
    composer: Composer,
    transcript: Transcript,
    persona_id: Option<String>,
}

impl ChatController {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        memory: Arc<dyn MemoryStore>,
        personas: Arc<dyn PersonaDirectory>,
    ) -> Self {
        Self {
            transport,
            memory,
            personas,
            markup: None,
            composer: Composer::new(),
            transcript: Transcript::new(),
            persona_id: None,
        }
    }

    pub fn with_markup(mut self, markup: Arc<dyn MarkupRenderer>) -> Self {
        self.markup = Some(markup);
        self
    }

    pub fn persona_id(&self) -> Option<&str> {
        self.persona_id.as_deref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn is_busy(&self) -> bool {
        !self.composer.is_enabled()
    }

    /// Rebuilds the transcript from the active persona's stored history.
    pub async fn load_history(&mut self) -> Result<usize, SessionError> {
        let history = self.memory.recent(self.persona_id()).await?;
        let count = history.len();
        self.transcript.replace_with_history(history);
        info!(persona = ?self.persona_id, entries = count, "loaded chat history");
        Ok(count)
    }

    /// Sends `text` with every pending image and streams the reply into
    /// `renderer`.
    ///
    /// Both entries are added to the transcript before the request goes
    /// out. When the stream cannot be opened the assistant entry shows the
    /// failure and the error is returned. Server timestamps reported by
    /// `Done` are bound to the entries once the stream has settled.
    pub async fn submit<R>(
        &mut self,
        text: &str,
        renderer: &mut R,
    ) -> Result<SubmitOutcome, SessionError>
    where
        R: Renderer + ?Sized,
    {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let Some(submission) = self.composer.take_submission(text) else {
            return Ok(SubmitOutcome::Skipped);
        };

        let request = submission.to_request(self.persona_id.as_deref());
        let user_entry = self
            .transcript
            .push_user(submission.message, submission.images);
        let assistant_entry = self.transcript.push_assistant();

        let result = {
            let _busy = BusyGuard::engage(&mut self.composer);
            run_exchange(
                self.transport.as_ref(),
                &request,
                renderer,
                self.markup.as_deref(),
            )
            .await
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%error, "chat exchange could not start");
                self.transcript
                    .fail_assistant(assistant_entry, error.user_message())?;
                return Err(error.into());
            }
        };

        self.transcript
            .finish_assistant(assistant_entry, &outcome.summary)?;
        let mut reconciled = Vec::new();
        let bindings = [
            (user_entry, outcome.summary.user_timestamp.clone()),
            (assistant_entry, outcome.summary.assistant_timestamp.clone()),
        ];
        for (entry, timestamp) in bindings {
            if let Some(timestamp) = timestamp {
                if self.transcript.bind_timestamp(entry, timestamp)? {
                    reconciled.push(entry);
                }
            }
        }

        Ok(SubmitOutcome::Exchanged(ExchangeReport {
            user_entry,
            assistant_entry,
            outcome,
            reconciled,
        }))
    }

    pub async fn delete(&mut self, entry: EntryId) -> Result<MessageRecord, SessionError> {
        self.transcript
            .delete(self.memory.as_ref(), self.persona_id.as_deref(), entry)
            .await
    }

    /// Clears the active persona's memory. The transcript is only emptied
    /// once the store confirms.
    pub async fn clear(&mut self) -> Result<(), SessionError> {
        self.memory.clear(self.persona_id()).await?;
        self.transcript.clear();
        info!(persona = ?self.persona_id, "cleared chat memory");
        Ok(())
    }

    pub async fn personas(&self, public_only: bool) -> Result<PersonaListing, SessionError> {
        Ok(self.personas.list(public_only).await?)
    }

    /// Makes `persona_id` active without loading its history.
    pub async fn select_persona(
        &mut self,
        persona_id: &str,
    ) -> Result<PersonaSummary, SessionError> {
        let persona = self.resolve_persona(persona_id).await?;
        self.persona_id = Some(persona.id.clone());
        self.transcript.clear();
        Ok(persona)
    }

    /// Makes `persona_id` active and replaces the transcript with its
    /// history. Nothing changes if the persona is unknown or the history
    /// cannot be fetched.
    pub async fn switch_persona(
        &mut self,
        persona_id: &str,
    ) -> Result<PersonaSummary, SessionError> {
        let persona = self.resolve_persona(persona_id).await?;
        let history = self.memory.recent(Some(&persona.id)).await?;
        let count = history.len();
        self.persona_id = Some(persona.id.clone());
        self.transcript.replace_with_history(history);
        info!(persona = %persona.id, entries = count, "switched persona");
        Ok(persona)
    }

    async fn resolve_persona(&self, persona_id: &str) -> Result<PersonaSummary, SessionError> {
        let persona_id = persona_id.trim();
        self.personas
            .lookup(persona_id)
            .await?
            .ok_or_else(|| SessionError::UnknownPersona(persona_id.to_string()))
    }
}
