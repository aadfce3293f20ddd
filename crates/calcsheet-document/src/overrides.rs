//! URL-encoded input overrides.
//!
//! Query parameters whose key matches an input node's label pre-populate that input's
//! override at load time, and the current overrides are written back to the location
//! (debounced, replaced in place) so a link reproduces the calculation case.

use std::time::Duration;

use calcsheet_model::{Field, NodeBody, NodeId, SheetId, VersionId};
use tokio::time::Instant;
use url::{form_urlencoded, Url};

use crate::document::GraphDocument;

/// Where the current query string is shown (the browser location in a web host).
pub trait LocationBar {
    /// Replace the query of the current location without creating a navigation entry.
    fn replace_query(&mut self, query: &str);
}

/// Apply `?label=value` pairs to matching input nodes before the first recompute.
///
/// Runs suppressed: no history, no change signal, allowed on read-only documents.
/// Unknown keys are ignored; if a key repeats the last value wins. Returns the ids of
/// nodes whose override changed.
pub fn apply_query_overrides(doc: &mut GraphDocument, query: &str) -> Vec<NodeId> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut changed = Vec::new();
    for (key, value) in pairs {
        let targets: Vec<NodeId> = doc
            .nodes()
            .iter()
            .filter(|n| matches!(n.body, NodeBody::Input { .. }) && n.label.trim() == key)
            .map(|n| n.id.clone())
            .collect();
        if targets.is_empty() {
            tracing::debug!(key = %key, "query parameter matches no input");
            continue;
        }
        for id in targets {
            let result = doc.suppressed(|d| d.set_value(&id, Field::Override, value.clone()));
            match result {
                Ok(true) => {
                    if !changed.contains(&id) {
                        changed.push(id);
                    }
                }
                Ok(false) => {}
                Err(err) => tracing::warn!(node = %id, error = %err, "failed to apply override"),
            }
        }
    }
    changed
}

/// Serialize the current overrides as a query string (without the leading `?`), in
/// node order.
pub fn overrides_query(doc: &GraphDocument) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for node in doc.nodes() {
        if let NodeBody::Input {
            override_value: Some(value),
            ..
        } = &node.body
        {
            serializer.append_pair(node.label.trim(), value);
        }
    }
    serializer.finish()
}

/// Build the "open in new tab" link for drilling into a nested sheet, carrying the
/// resolved input values forward as query parameters.
pub fn drill_down_url<I, K, V>(
    base: &Url,
    sheet_id: &SheetId,
    version_id: Option<&VersionId>,
    values: I,
) -> Result<Url, url::ParseError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
        segments.pop_if_empty().push("sheets").push(sheet_id.as_str());
        if let Some(version_id) = version_id {
            segments.push("versions").push(version_id.as_str());
        }
    }
    let values: Vec<(K, V)> = values.into_iter().collect();
    if !values.is_empty() {
        url.query_pairs_mut().extend_pairs(values);
    }
    Ok(url)
}

#[derive(Debug)]
struct PendingQuery {
    due: Instant,
    query: String,
}

/// Debounced writer of [`overrides_query`] into a [`LocationBar`].
#[derive(Debug)]
pub struct OverrideSync<L> {
    bar: L,
    debounce: Duration,
    pending: Option<PendingQuery>,
    last_written: String,
}

impl<L: LocationBar> OverrideSync<L> {
    /// `current_query` is what the location shows right now (usually the query the
    /// sheet was opened with).
    pub fn new(bar: L, debounce: Duration, current_query: impl Into<String>) -> Self {
        let mut sync = Self {
            bar,
            debounce,
            pending: None,
            last_written: String::new(),
        };
        sync.reset(current_query);
        sync
    }

    /// The location now shows `current_query` (a different sheet was opened). Drops
    /// any pending write.
    pub fn reset(&mut self, current_query: impl Into<String>) {
        let current_query = current_query.into();
        self.pending = None;
        self.last_written = current_query
            .strip_prefix('?')
            .map(str::to_string)
            .unwrap_or(current_query);
    }

    /// Note that input values changed; restarts the debounce window.
    pub fn note_change(&mut self, doc: &GraphDocument, now: Instant) {
        self.pending = Some(PendingQuery {
            due: now + self.debounce,
            query: overrides_query(doc),
        });
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    /// Write the pending query if its window elapsed. Returns whether the location
    /// was replaced.
    pub fn poll(&mut self, now: Instant) -> bool {
        match &self.pending {
            Some(pending) if pending.due <= now => {}
            _ => return false,
        }
        let Some(pending) = self.pending.take() else {
            return false;
        };
        if pending.query == self.last_written {
            return false;
        }
        self.bar.replace_query(&pending.query);
        self.last_written = pending.query;
        true
    }

    pub fn location_bar(&self) -> &L {
        &self.bar
    }
}
