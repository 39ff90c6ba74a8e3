//! Member directory
//!
//! The hub only needs to read members and their per-gym memberships. The
//! directory is a trait so a real member service can replace the in-memory
//! store seeded from `[[hub.members]]`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gymgate_common::config::MemberSeed;
use std::collections::HashMap;
use std::sync::RwLock;

/// A gym member
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub member_id: String,
    pub full_name: String,
    pub photo_url: Option<String>,
}

/// A member's subscription at one gym
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub gym_id: String,
    pub active: bool,
    pub subscription_end: Option<DateTime<Utc>>,
}

impl Membership {
    /// Past its end date at `now`; open-ended memberships never expire
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.subscription_end.is_some_and(|end| end < now)
    }
}

/// Read access to members and memberships
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn member(&self, member_id: &str) -> Option<Member>;

    /// Active membership of `member_id` at `gym_id`, if any
    async fn active_membership(&self, member_id: &str, gym_id: &str) -> Option<Membership>;
}

#[derive(Debug, Clone)]
struct Entry {
    member: Member,
    memberships: Vec<Membership>,
}

/// Directory held in memory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config seed records
    pub fn from_seeds(seeds: &[MemberSeed]) -> Self {
        let directory = Self::new();
        for seed in seeds {
            directory.upsert(
                Member {
                    member_id: seed.member_id.clone(),
                    full_name: seed.full_name.clone(),
                    photo_url: seed.photo_url.clone(),
                },
                seed.memberships
                    .iter()
                    .map(|m| Membership {
                        gym_id: m.gym_id.clone(),
                        active: m.active,
                        subscription_end: m.subscription_end,
                    })
                    .collect(),
            );
        }
        directory
    }

    /// Insert or replace a member and their memberships
    pub fn upsert(&self, member: Member, memberships: Vec<Membership>) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(member.member_id.clone(), Entry { member, memberships });
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemberDirectory for InMemoryDirectory {
    async fn member(&self, member_id: &str) -> Option<Member> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries.get(member_id).map(|e| e.member.clone())
    }

    async fn active_membership(&self, member_id: &str, gym_id: &str) -> Option<Membership> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries
            .get(member_id)?
            .memberships
            .iter()
            .find(|m| m.gym_id == gym_id && m.active)
            .cloned()
    }
}
