//! Per-run cache of canonical tables keyed by (dataset id, table type).
//!
//! Each key is populated at most once; concurrent callers for the same key
//! block on the first load and then share the same immutable [`Frame`].
//! Load failures are cached as well so every summary sees the same reason.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock},
};

use log::debug;

use crate::{
    error::{SummaryError, SummaryResult},
    frame::Frame,
};

type Slot = Arc<OnceLock<SummaryResult<Arc<Frame>>>>;

#[derive(Debug, Default)]
pub struct TableCache {
    slots: Mutex<HashMap<(String, String), Slot>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load<F>(&self, dataset: &str, table: &str, load: F) -> SummaryResult<Arc<Frame>>
    where
        F: FnOnce() -> SummaryResult<Frame>,
    {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slots
                .entry((dataset.to_string(), table.to_string()))
                .or_default()
                .clone()
        };
        let cached = slot.get_or_init(|| {
            debug!("Loading table '{table}' for dataset '{dataset}'");
            load().map(Arc::new)
        });
        match cached {
            Ok(frame) => Ok(Arc::clone(frame)),
            Err(err) => Err(err.replicate()),
        }
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| slots.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
