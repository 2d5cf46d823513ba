// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Startup seeding of users and pets from a JSON file.
//!
//! Account and pet management live outside this service; the seed file is
//! how they reach the store.

use std::path::Path;

use serde::Deserialize;

use super::Db;
use crate::models::{Pet, User};

/// Seed file contents.
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub pets: Vec<Pet>,
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse seed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Pet {pet_id} references unknown owner {owner_id}")]
    UnknownOwner { pet_id: u64, owner_id: u64 },

    #[error("Store error: {0}")]
    Store(String),
}

impl SeedData {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write users then pets into `db`. Every pet must belong to a seeded user.
    pub async fn apply(self, db: &Db) -> Result<(usize, usize), SeedError> {
        for pet in &self.pets {
            if !self.users.iter().any(|u| u.id == pet.owner_id) {
                return Err(SeedError::UnknownOwner {
                    pet_id: pet.id,
                    owner_id: pet.owner_id,
                });
            }
        }

        for user in &self.users {
            db.upsert_user(user)
                .await
                .map_err(|e| SeedError::Store(e.to_string()))?;
        }
        for pet in &self.pets {
            db.upsert_pet(pet)
                .await
                .map_err(|e| SeedError::Store(e.to_string()))?;
        }

        Ok((self.users.len(), self.pets.len()))
    }
}
