use std::future::Future;

use chrono::Utc;
use clarity_types::UserProfileUpdate;

use crate::entities::{AnyStore, dao::Profile, format_ts, from_json, parse_ts, to_json};

type ProfileRow = (String, String, String, Option<String>, String, String, String, Option<String>);

const PROFILE_COLUMNS: &str =
    "user_id, email, full_name, avatar_url, preferences, therapy_goals, created_at, updated_at";

pub trait ProfileStore: Send + Sync + 'static {
    fn get_profile(&self, user_id: &str) -> impl Future<Output = Result<Option<Profile>, sqlx::Error>> + Send;
    /// Inserts `profile` unless a row for the user exists; returns the stored
    /// row either way.
    fn insert_profile(&self, profile: &Profile) -> impl Future<Output = Result<Profile, sqlx::Error>> + Send;
    /// Applies the fields present in `update`; `None` when there is no
    /// profile.
    fn update_profile(
        &self,
        user_id: &str,
        update: &UserProfileUpdate,
    ) -> impl Future<Output = Result<Option<Profile>, sqlx::Error>> + Send;
}

fn from_row(
    (user_id, email, full_name, avatar_url, preferences, therapy_goals, created_at, updated_at): ProfileRow,
) -> Profile {
    Profile {
        user_id,
        email,
        full_name,
        avatar_url,
        preferences: from_json(&preferences),
        therapy_goals: from_json(&therapy_goals),
        created_at: parse_ts(&created_at),
        updated_at: updated_at.as_deref().map(parse_ts),
    }
}

impl ProfileStore for AnyStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, sqlx::Error> {
        let row: Option<ProfileRow> =
            sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(from_row))
    }

    async fn insert_profile(&self, profile: &Profile) -> Result<Profile, sqlx::Error> {
        sqlx::query(&format!(
            "INSERT INTO profiles ({PROFILE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id) DO NOTHING"
        ))
        .bind(&profile.user_id)
        .bind(&profile.email)
        .bind(&profile.full_name)
        .bind(profile.avatar_url.as_deref())
        .bind(to_json(&profile.preferences)?)
        .bind(to_json(&profile.therapy_goals)?)
        .bind(format_ts(&profile.created_at))
        .bind(profile.updated_at.as_ref().map(format_ts))
        .execute(&self.pool)
        .await?;
        self.get_profile(&profile.user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn update_profile(&self, user_id: &str, update: &UserProfileUpdate) -> Result<Option<Profile>, sqlx::Error> {
        let Some(mut profile) = self.get_profile(user_id).await? else {
            return Ok(None);
        };
        if let Some(full_name) = &update.full_name {
            profile.full_name = full_name.clone();
        }
        if let Some(avatar_url) = &update.avatar_url {
            profile.avatar_url = Some(avatar_url.clone());
        }
        if let Some(preferences) = &update.preferences {
            profile.preferences = preferences.clone();
        }
        if let Some(goals) = &update.therapy_goals {
            profile.therapy_goals = goals.clone();
        }
        profile.updated_at = Some(Utc::now());

        sqlx::query(
            "UPDATE profiles SET full_name = $1, avatar_url = $2, preferences = $3, therapy_goals = $4, \
             updated_at = $5 WHERE user_id = $6",
        )
        .bind(&profile.full_name)
        .bind(profile.avatar_url.as_deref())
        .bind(to_json(&profile.preferences)?)
        .bind(to_json(&profile.therapy_goals)?)
        .bind(profile.updated_at.as_ref().map(format_ts))
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(Some(profile))
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;
    use crate::entities::test_support::memory_store;

    fn profile(user_id: &str) -> Profile {
        Profile {
            user_id: user_id.into(),
            email: format!("{user_id}@example.com"),
            full_name: "Alice".into(),
            avatar_url: None,
            preferences: HashMap::new(),
            therapy_goals: vec![],
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn insert_keeps_existing_row() {
        let store = memory_store().await;
        store.insert_profile(&profile("alice")).await.unwrap();
        let mut other = profile("alice");
        other.full_name = "Someone Else".into();
        let stored = store.insert_profile(&other).await.unwrap();
        assert_eq!(stored.full_name, "Alice");
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields() {
        let store = memory_store().await;
        store.insert_profile(&profile("alice")).await.unwrap();

        let update = UserProfileUpdate {
            therapy_goals: Some(vec!["sleep better".into()]),
            preferences: Some(HashMap::from([("theme".to_string(), serde_json::json!("dark"))])),
            ..Default::default()
        };
        let updated = store.update_profile("alice", &update).await.unwrap().unwrap();
        assert_eq!(updated.full_name, "Alice");
        assert_eq!(updated.therapy_goals, ["sleep better"]);
        assert!(updated.updated_at.is_some());

        let reread = store.get_profile("alice").await.unwrap().unwrap();
        assert_eq!(reread.preferences["theme"], "dark");
        assert_eq!(reread.therapy_goals, ["sleep better"]);
    }

    #[tokio::test]
    async fn update_without_profile_is_none() {
        let store = memory_store().await;
        let update = UserProfileUpdate::default();
        assert!(store.update_profile("ghost", &update).await.unwrap().is_none());
    }
}
