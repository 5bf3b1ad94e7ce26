use std::collections::HashSet;

use log::debug;

use super::scheduler::{Dispatcher, FetchOutcome};

/// Remembers which image URLs were already handed to the downloader.
#[derive(Debug, Default)]
pub struct ImagePreloader {
    issued: HashSet<String>,
}

impl ImagePreloader {
    /// Returns `false` when the URL was empty or already issued.
    pub fn preload(&mut self, url: Option<&str>, dispatcher: &Dispatcher) -> bool {
        let url = match url {
            Some(url) if !url.is_empty() => url,
            _ => return false,
        };
        if !self.issued.insert(url.to_string()) {
            return false;
        }

        debug!("preloading image {}", url);
        let source = dispatcher.source();
        let url = url.to_string();
        dispatcher.spawn(async move {
            let image = source.fetch_image(&url).await;
            FetchOutcome::Image { url, image }
        });
        true
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }

    pub fn clear(&mut self) {
        self.issued.clear();
    }
}
