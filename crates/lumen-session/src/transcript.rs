//! Rendered conversation entries and their reconciliation with the server.
//!
//! Entries are shown optimistically, before the server has stored them.
//! Once the stream reports the stored timestamps, each entry is bound to its
//! timestamp exactly once. The timestamp is the only key the memory store
//! accepts for deletion.

use std::fmt;

use lumen_ai::{GeneratedImage, MemoryEntry, MemoryStore, MessageId, MessageRole};
use tracing::{debug, info};

use crate::{composer::ImagePayload, error::SessionError, session::SessionSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Client-local handle of a transcript entry.
pub struct EntryId(u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One rendered chat entry.
pub struct MessageRecord {
    id: EntryId,
    pub role: MessageRole,
    pub text: String,
    pub attachments: Vec<ImagePayload>,
    pub generated_image: Option<GeneratedImage>,
    pub image_pending: bool,
    pub sources: Vec<String>,
    pub is_error: bool,
    timestamp: Option<MessageId>,
}

impl MessageRecord {
    fn new(id: EntryId, role: MessageRole, text: String) -> Self {
        Self {
            id,
            role,
            text,
            attachments: Vec::new(),
            generated_image: None,
            image_pending: false,
            sources: Vec::new(),
            is_error: false,
            timestamp: None,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn timestamp(&self) -> Option<&MessageId> {
        self.timestamp.as_ref()
    }

    /// Deletion is only possible once the entry carries a server timestamp.
    pub fn is_deletable(&self) -> bool {
        self.timestamp.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<MessageRecord>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> EntryId {
        self.next_id += 1;
        EntryId(self.next_id)
    }

    pub fn push_user(
        &mut self,
        text: impl Into<String>,
        attachments: Vec<ImagePayload>,
    ) -> EntryId {
        let id = self.allocate();
        let mut record = MessageRecord::new(id, MessageRole::User, text.into());
        record.attachments = attachments;
        self.entries.push(record);
        id
    }

    /// Adds an empty assistant entry that the running exchange will fill.
    pub fn push_assistant(&mut self) -> EntryId {
        let id = self.allocate();
        self.entries
            .push(MessageRecord::new(id, MessageRole::Assistant, String::new()));
        id
    }

    pub fn finish_assistant(
        &mut self,
        id: EntryId,
        summary: &SessionSummary,
    ) -> Result<(), SessionError> {
        let record = self.get_mut(id)?;
        record.text = summary.text.clone();
        record.is_error = summary.is_error;
        record.sources = summary.sources.clone();
        record.generated_image = summary.generated_image.clone();
        record.image_pending = summary.image_pending;
        Ok(())
    }

    /// Shows a transport failure in place of the assistant reply.
    pub fn fail_assistant(
        &mut self,
        id: EntryId,
        message: impl Into<String>,
    ) -> Result<(), SessionError> {
        let record = self.get_mut(id)?;
        record.text = message.into();
        record.is_error = true;
        Ok(())
    }

    /// Binds `timestamp` to the entry. Returns `false` when the entry is
    /// already bound, leaving the first binding in place.
    pub fn bind_timestamp(
        &mut self,
        id: EntryId,
        timestamp: MessageId,
    ) -> Result<bool, SessionError> {
        let record = self.get_mut(id)?;
        if record.timestamp.is_some() {
            debug!(entry = %id, "entry already reconciled; ignoring rebind");
            return Ok(false);
        }
        record.timestamp = Some(timestamp);
        Ok(true)
    }

    pub fn get(&self, id: EntryId) -> Option<&MessageRecord> {
        self.entries.iter().find(|record| record.id == id)
    }

    fn get_mut(&mut self, id: EntryId) -> Result<&mut MessageRecord, SessionError> {
        self.entries
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(SessionError::UnknownEntry(id))
    }

    pub fn entries(&self) -> &[MessageRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find_by_timestamp(&self, timestamp: &MessageId) -> Option<&MessageRecord> {
        self.entries
            .iter()
            .find(|record| record.timestamp.as_ref() == Some(timestamp))
    }

    pub fn remove_by_timestamp(&mut self, timestamp: &MessageId) -> Option<MessageRecord> {
        let index = self
            .entries
            .iter()
            .position(|record| record.timestamp.as_ref() == Some(timestamp))?;
        Some(self.entries.remove(index))
    }

    /// Deletes the entry from the memory store, then from the transcript.
    /// On failure the entry stays where it is.
    pub async fn delete(
        &mut self,
        store: &dyn MemoryStore,
        persona_id: Option<&str>,
        id: EntryId,
    ) -> Result<MessageRecord, SessionError> {
        let record = self.get(id).ok_or(SessionError::UnknownEntry(id))?;
        let timestamp = record
            .timestamp
            .clone()
            .ok_or(SessionError::NotReconciled(id))?;

        store.delete(persona_id, &timestamp).await?;
        info!(entry = %id, %timestamp, "deleted message from memory");
        self.remove_by_timestamp(&timestamp)
            .ok_or(SessionError::UnknownEntry(id))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replaces every entry with stored history. Stored entries arrive
    /// already reconciled.
    pub fn replace_with_history(&mut self, history: Vec<MemoryEntry>) {
        self.entries.clear();
        for entry in history {
            let id = self.allocate();
            let mut record = MessageRecord::new(id, entry.role, entry.content);
            record.timestamp = entry.timestamp.filter(|timestamp| !timestamp.is_empty());
            if entry.role == MessageRole::Assistant {
                record.sources = entry.sources;
                record.generated_image = entry
                    .generated_image_path
                    .filter(|path| !path.trim().is_empty())
                    .map(GeneratedImage::Path);
            }
            self.entries.push(record);
        }
    }
}
