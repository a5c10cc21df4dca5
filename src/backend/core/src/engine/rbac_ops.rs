//! RBAC operations: per-project role grants and attestation
//! authorities. The role -> permission matrix itself is immutable.

use serde::Serialize;
use serde_json::json;

use super::Engine;
use crate::db;
use crate::error::{Error, Result};
use crate::events::{entity_kind, event_type};
use crate::rbac::perm;

/// An actor's standing within a project.
#[derive(Debug, Clone, Serialize)]
pub struct WhoAmI {
    pub actor_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl Engine {
    pub async fn grant_role(
        &self,
        actor: &str,
        project_id: &str,
        target_actor: &str,
        role_id: &str,
    ) -> Result<WhoAmI> {
        if target_actor.is_empty() {
            return Err(Error::bad_request_field("actor_id", "actor_id is required"));
        }

        let mut tx = self.store().begin().await?;
        self.require_project(&mut tx, project_id).await?;

        let roles = self.roles(&mut tx, project_id, actor).await?;
        if !self.has_permission(&roles, perm::RBAC_ADMIN) {
            drop(tx);
            return Err(self
                .deny(project_id, actor, perm::RBAC_ADMIN, entity_kind::RBAC, target_actor)
                .await);
        }
        if !self.matrix().known_role(role_id) {
            return Err(Error::bad_request_field("role_id", format!("unknown role {role_id}")));
        }

        db::grant_role(&mut tx, project_id, target_actor, role_id).await?;
        db::append_event(
            &mut tx,
            self.now(),
            event_type::RBAC_ROLE_GRANTED,
            project_id,
            entity_kind::RBAC,
            target_actor,
            actor,
            json!({"actor_id": target_actor, "role_id": role_id}),
        )
        .await?;

        let target_roles = self.roles(&mut tx, project_id, target_actor).await?;
        tx.commit().await?;

        let permissions = self.matrix().permissions_for(&target_roles);
        Ok(WhoAmI {
            actor_id: target_actor.to_string(),
            roles: target_roles,
            permissions,
        })
    }

    pub async fn revoke_role(
        &self,
        actor: &str,
        project_id: &str,
        target_actor: &str,
        role_id: &str,
    ) -> Result<WhoAmI> {
        let mut tx = self.store().begin().await?;
        self.require_project(&mut tx, project_id).await?;

        let roles = self.roles(&mut tx, project_id, actor).await?;
        if !self.has_permission(&roles, perm::RBAC_ADMIN) {
            drop(tx);
            return Err(self
                .deny(project_id, actor, perm::RBAC_ADMIN, entity_kind::RBAC, target_actor)
                .await);
        }

        db::revoke_role(&mut tx, project_id, target_actor, role_id).await?;
        db::append_event(
            &mut tx,
            self.now(),
            event_type::RBAC_ROLE_REVOKED,
            project_id,
            entity_kind::RBAC,
            target_actor,
            actor,
            json!({"actor_id": target_actor, "role_id": role_id}),
        )
        .await?;

        let target_roles = self.roles(&mut tx, project_id, target_actor).await?;
        tx.commit().await?;

        let permissions = self.matrix().permissions_for(&target_roles);
        Ok(WhoAmI {
            actor_id: target_actor.to_string(),
            roles: target_roles,
            permissions,
        })
    }

    /// Map an attestation kind to a role entitled to assert it.
    pub async fn set_attestation_authority(
        &self,
        actor: &str,
        project_id: &str,
        kind: &str,
        role_id: &str,
    ) -> Result<()> {
        let mut tx = self.store().begin().await?;
        self.require_project(&mut tx, project_id).await?;

        let roles = self.roles(&mut tx, project_id, actor).await?;
        if !self.has_permission(&roles, perm::RBAC_ADMIN) {
            drop(tx);
            return Err(self
                .deny(project_id, actor, perm::RBAC_ADMIN, entity_kind::RBAC, kind)
                .await);
        }
        if !self.matrix().known_role(role_id) {
            return Err(Error::bad_request_field("role_id", format!("unknown role {role_id}")));
        }
        let config = self.project_config(&mut tx, project_id).await?;
        if !config.has_kind(kind) {
            return Err(Error::bad_request_field(
                "kind",
                format!("attestation kind {kind} is not in the project catalog"),
            ));
        }

        db::set_authority(&mut tx, project_id, kind, role_id).await?;
        db::append_event(
            &mut tx,
            self.now(),
            event_type::RBAC_AUTHORITY_SET,
            project_id,
            entity_kind::RBAC,
            kind,
            actor,
            json!({"kind": kind, "role_id": role_id}),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// The caller's roles and effective permissions within a project.
    pub async fn whoami(&self, actor: &str, project_id: &str) -> Result<WhoAmI> {
        let mut conn = self.store().read_conn().await?;
        self.require_project(&mut conn, project_id).await?;
        let roles = db::actor_roles(&mut conn, project_id, actor).await?;
        let permissions = self.matrix().permissions_for(&roles);
        Ok(WhoAmI {
            actor_id: actor.to_string(),
            roles,
            permissions,
        })
    }
}
