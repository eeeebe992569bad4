//! Gallery browsing: filtering, ordering and windowing over the full image
//! list, plus the rotating weekly selection.

use crate::models::Image;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GallerySort {
    Recent,
    Likes,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GalleryQuery {
    pub game: Option<String>,
    pub genre: Option<String>,
    pub search: Option<String>,
    pub sort: Option<GallerySort>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Serialize, Debug)]
pub struct GalleryPage {
    /// Matches before `offset`/`limit` were applied.
    pub total: usize,
    pub offset: usize,
    pub images: Vec<Image>,
}

// Empty selector values come from "all" dropdown entries.
fn selector(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl GalleryQuery {
    pub fn matches(&self, image: &Image) -> bool {
        let submission = &image.submission;

        if let Some(game) = selector(&self.game) {
            if submission.game != game {
                return false;
            }
        }
        if let Some(genre) = selector(&self.genre) {
            if submission.genre != genre {
                return false;
            }
        }
        if let Some(search) = selector(&self.search) {
            let needle = search.to_lowercase();
            let haystacks = [
                Some(submission.game.as_str()),
                Some(submission.genre.as_str()),
                Some(submission.title.as_str()),
                Some(submission.uploader_id.as_str()),
                submission.uploader_email.as_deref(),
            ];
            if !haystacks
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }

    /// Filters, orders and windows `images`. Without a sort the input order
    /// is kept.
    pub fn apply(&self, images: Vec<Image>) -> GalleryPage {
        let mut matched: Vec<Image> = images.into_iter().filter(|image| self.matches(image)).collect();

        match self.sort {
            Some(GallerySort::Recent) => matched.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at)),
            Some(GallerySort::Likes) => matched.sort_by(|a, b| b.likes.cmp(&a.likes)),
            None => {}
        }

        let total = matched.len();
        let offset = self.offset.unwrap_or(0).min(total);
        let images = matched
            .into_iter()
            .skip(offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();

        GalleryPage { total, offset, images }
    }
}

/// ISO week label, e.g. `2026-W42`.
pub fn week_key(now: DateTime<Utc>) -> String {
    let week = now.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Picks up to `size` images for the week containing `now`. The pick is
/// stable within a week and reshuffles when the week changes.
pub fn weekly_selection(images: Vec<Image>, now: DateTime<Utc>, size: usize) -> Vec<Image> {
    let key = week_key(now);
    let mut ranked: Vec<([u8; 32], Image)> = images
        .into_iter()
        .map(|image| {
            let digest = Sha256::digest(format!("{}:{}", key, image.image_id).as_bytes());
            (digest.into(), image)
        })
        .collect();
    ranked.sort_by(|a, b| a.0.cmp(&b.0));
    ranked.into_iter().take(size).map(|(_, image)| image).collect()
}
