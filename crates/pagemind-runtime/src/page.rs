//! Content context: serves page text and selection requests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::{
    error::{Error, Result},
    extractor::{self, Selection},
    protocol::{Payload, Request},
    transport::{self, CONTENT, Handler, Port},
};

#[derive(Debug, Default)]
struct PageState {
    html: Option<String>,
    selection: String,
}

/// The page currently shown to the user.
///
/// Clones share the same page, so the owner can keep updating it after the
/// context has been spawned.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    state: Arc<RwLock<PageState>>,
}

impl PageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the page. Clears the selection.
    pub fn set_page(&self, html: impl Into<String>) {
        let mut state = self.state.write();
        state.html = Some(html.into());
        state.selection.clear();
    }

    pub fn set_selection(&self, text: impl Into<String>) {
        self.state.write().selection = text.into();
    }

    /// Main readable text of the current page
    pub fn content(&self) -> Result<String> {
        let state = self.state.read();
        let html = state
            .html
            .as_deref()
            .ok_or_else(|| Error::ExtractionFailed("no page is open".to_string()))?;
        Ok(extractor::extract_main_content(html))
    }

    pub fn selection(&self) -> Selection {
        Selection::from_raw(&self.state.read().selection)
    }

    /// Spawn the content context serving this page
    pub fn spawn(&self) -> (Port, JoinHandle<()>) {
        transport::spawn_context(CONTENT, Arc::new(self.clone()))
    }
}

#[async_trait]
impl Handler for PageContext {
    async fn handle(&self, request: Request) -> Result<Payload> {
        match request {
            Request::GetPageContent => Ok(Payload::PageContent {
                content: self.content()?,
            }),
            Request::GetSelection => {
                let Selection {
                    text,
                    has_selection,
                } = self.selection();
                Ok(Payload::Selection {
                    text,
                    has_selection,
                })
            }
            other => Err(transport::unsupported(&other)),
        }
    }
}
