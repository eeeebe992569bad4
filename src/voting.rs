//! Like/dislike toggling.
//!
//! A vote request is resolved against the voter's current state into exactly
//! one [`VoteTransition`]. Repositories apply the transition as a single write
//! conditioned on the state it was resolved from, so a voter is never in both
//! the liker and disliker sets.

use crate::models::Image;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Like,
    Dislike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteState {
    None,
    Liked,
    Disliked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTransition {
    AddLike,
    RemoveLike,
    SwitchToLike,
    AddDislike,
    RemoveDislike,
    SwitchToDislike,
}

impl VoteTransition {
    /// Repeating the current vote undoes it; voting the other way switches.
    pub fn resolve(state: VoteState, kind: VoteKind) -> Self {
        match (state, kind) {
            (VoteState::None, VoteKind::Like) => VoteTransition::AddLike,
            (VoteState::Liked, VoteKind::Like) => VoteTransition::RemoveLike,
            (VoteState::Disliked, VoteKind::Like) => VoteTransition::SwitchToLike,
            (VoteState::None, VoteKind::Dislike) => VoteTransition::AddDislike,
            (VoteState::Disliked, VoteKind::Dislike) => VoteTransition::RemoveDislike,
            (VoteState::Liked, VoteKind::Dislike) => VoteTransition::SwitchToDislike,
        }
    }

    /// The voter state this transition was resolved from.
    pub fn from_state(self) -> VoteState {
        match self {
            VoteTransition::AddLike | VoteTransition::AddDislike => VoteState::None,
            VoteTransition::RemoveLike | VoteTransition::SwitchToDislike => VoteState::Liked,
            VoteTransition::RemoveDislike | VoteTransition::SwitchToLike => VoteState::Disliked,
        }
    }

    pub fn to_state(self) -> VoteState {
        match self {
            VoteTransition::AddLike | VoteTransition::SwitchToLike => VoteState::Liked,
            VoteTransition::AddDislike | VoteTransition::SwitchToDislike => VoteState::Disliked,
            VoteTransition::RemoveLike | VoteTransition::RemoveDislike => VoteState::None,
        }
    }

    pub fn like_delta(self) -> i64 {
        match self {
            VoteTransition::AddLike | VoteTransition::SwitchToLike => 1,
            VoteTransition::RemoveLike | VoteTransition::SwitchToDislike => -1,
            VoteTransition::AddDislike | VoteTransition::RemoveDislike => 0,
        }
    }

    pub fn dislike_delta(self) -> i64 {
        match self {
            VoteTransition::AddDislike | VoteTransition::SwitchToDislike => 1,
            VoteTransition::RemoveDislike | VoteTransition::SwitchToLike => -1,
            VoteTransition::AddLike | VoteTransition::RemoveLike => 0,
        }
    }
}

impl Image {
    pub fn vote_state(&self, user_id: &str) -> VoteState {
        if self.likers.contains(user_id) {
            VoteState::Liked
        } else if self.dislikers.contains(user_id) {
            VoteState::Disliked
        } else {
            VoteState::None
        }
    }

    /// Applies `transition` for `user_id`. Counters never drop below zero.
    pub fn apply_vote(&mut self, user_id: &str, transition: VoteTransition) {
        self.likes = (self.likes + transition.like_delta()).max(0);
        self.dislikes = (self.dislikes + transition.dislike_delta()).max(0);

        match transition.to_state() {
            VoteState::Liked => {
                self.dislikers.remove(user_id);
                self.likers.insert(user_id.to_string());
            }
            VoteState::Disliked => {
                self.likers.remove(user_id);
                self.dislikers.insert(user_id.to_string());
            }
            VoteState::None => {
                self.likers.remove(user_id);
                self.dislikers.remove(user_id);
            }
        }
    }

    /// Resolves and applies a vote in one step, returning what happened.
    pub fn toggle_vote(&mut self, user_id: &str, kind: VoteKind) -> VoteTransition {
        let transition = VoteTransition::resolve(self.vote_state(user_id), kind);
        self.apply_vote(user_id, transition);
        transition
    }
}
