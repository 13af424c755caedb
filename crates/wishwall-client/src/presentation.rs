//! Feed rendering
//!
//! [`render`] turns a [`FeedSnapshot`] into a [`FeedView`]. It owns no state;
//! callers re-render whenever the feed publishes a new snapshot.

use std::fmt::Write as _;
use std::time::Duration;

use wishwall_core::{Wish, WishId};

use crate::config::ClientConfig;
use crate::feed::{FeedSnapshot, FeedStatus};

/// Caption shown under the carousel
pub const CAROUSEL_HINT: &str = "Swipe to read more wishes";

/// Text shown when no wishes exist yet
pub const EMPTY_MESSAGE: &str = "No wishes yet. Be the first one to send a wish!";

/// Carousel behavior knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationPolicy {
    /// Looping and autoplay need strictly more entries than this
    pub loop_threshold: usize,
    pub autoplay_delay: Duration,
}

impl Default for PresentationPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl PresentationPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            loop_threshold: config.loop_threshold,
            autoplay_delay: config.autoplay_delay(),
        }
    }
}

/// Avatar of a wish card
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Avatar {
    Photo(String),
    /// First letter of the name, upper-cased
    Initial(char),
}

/// One slide of the carousel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WishCard {
    pub id: WishId,
    pub name: String,
    pub relation: String,
    pub wish: String,
    pub avatar: Avatar,
    pub date_label: String,
}

impl WishCard {
    pub fn from_wish(wish: &Wish) -> Self {
        let avatar = match &wish.photo_url {
            Some(url) if !url.is_empty() => Avatar::Photo(url.clone()),
            _ => Avatar::Initial(initial_of(&wish.name)),
        };
        Self {
            id: wish.id.clone(),
            name: wish.name.clone(),
            relation: wish.relation.to_string(),
            wish: wish.wish.clone(),
            avatar,
            date_label: wish.created_at.format("%Y-%m-%d").to_string(),
        }
    }
}

fn initial_of(name: &str) -> char {
    name.trim()
        .chars()
        .next()
        .and_then(|c| c.to_uppercase().next())
        .unwrap_or('?')
}

/// What the feed area shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedView {
    Loading,
    /// Banner in place of content
    Error { message: String },
    Empty,
    Carousel {
        cards: Vec<WishCard>,
        looping: bool,
        /// `None` when autoplay is off
        autoplay: Option<Duration>,
    },
}

/// Render a snapshot
pub fn render(snapshot: &FeedSnapshot, policy: &PresentationPolicy) -> FeedView {
    match &snapshot.status {
        FeedStatus::Failed(message) => {
            return FeedView::Error {
                message: message.clone(),
            };
        }
        FeedStatus::Loading if snapshot.wishes.is_empty() => return FeedView::Loading,
        _ => {}
    }

    if snapshot.wishes.is_empty() {
        return FeedView::Empty;
    }

    let looping = snapshot.wishes.len() > policy.loop_threshold;
    FeedView::Carousel {
        cards: snapshot.wishes.iter().map(WishCard::from_wish).collect(),
        looping,
        autoplay: looping.then_some(policy.autoplay_delay),
    }
}

impl FeedView {
    /// Number of cards shown
    pub fn len(&self) -> usize {
        match self {
            Self::Carousel { cards, .. } => cards.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Plain-text rendering for terminals
    pub fn to_text(&self) -> String {
        match self {
            Self::Loading => "Loading wishes...\n".to_string(),
            Self::Error { message } => format!("Could not load wishes: {message}\n"),
            Self::Empty => format!("{EMPTY_MESSAGE}\n"),
            Self::Carousel {
                cards,
                looping,
                autoplay,
            } => {
                let mut out = String::new();
                for card in cards {
                    let avatar = match &card.avatar {
                        Avatar::Photo(url) => format!("[photo {url}]"),
                        Avatar::Initial(c) => format!("[{c}]"),
                    };
                    let _ = writeln!(
                        out,
                        "{avatar} {} ({}) {}\n    {}",
                        card.name, card.relation, card.date_label, card.wish
                    );
                }
                let mode = match (looping, autoplay) {
                    (true, Some(delay)) => format!("looping, autoplay every {}ms", delay.as_millis()),
                    _ => "static".to_string(),
                };
                let _ = writeln!(out, "{CAROUSEL_HINT} ({} wishes, {mode})", cards.len());
                out
            }
        }
    }
}
