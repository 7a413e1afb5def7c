//! Organization provisioning and deprovisioning
//!
//! Provisioning runs an ordered sequence of independent setup steps.
//! Every step is attempted regardless of earlier failures; each failure
//! is captured into the result instead of thrown, and the aggregate
//! status falls out of the per-step outcomes. Steps run to completion or
//! failure; there is no mid-step cancellation.

use crate::member::{MemberDirectory, OrgRole};
use crate::organization::{Organization, OrgStatus};
use crate::registry::{OrganizationUpdate, TenantRegistry};
use crate::store::TenantStore;
use crate::{Result, TenantError};
use campus_core::traits::Notifier;
use campus_core::OrgId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Provisioning steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    CreateAdminMember,
    InitializeDefaultSettings,
    ConfigureTierFeatures,
    MarkVerified,
    SendWelcomeNotification,
}

impl ProvisionStep {
    pub const ALL: [ProvisionStep; 5] = [
        Self::CreateAdminMember,
        Self::InitializeDefaultSettings,
        Self::ConfigureTierFeatures,
        Self::MarkVerified,
        Self::SendWelcomeNotification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateAdminMember => "create_admin_member",
            Self::InitializeDefaultSettings => "initialize_default_settings",
            Self::ConfigureTierFeatures => "configure_tier_features",
            Self::MarkVerified => "mark_verified",
            Self::SendWelcomeNotification => "send_welcome_notification",
        }
    }
}

impl std::fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate provisioning status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStatus {
    /// Every step completed
    Success,
    /// At least one step completed and at least one failed
    PartialSuccess,
    /// No step completed
    Failed,
    /// The organization was already fully provisioned; no step ran
    AlreadyProvisioned,
}

impl ProvisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
            Self::AlreadyProvisioned => "already_provisioned",
        }
    }
}

/// Outcome of one provisioning step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: ProvisionStep,
    pub succeeded: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Tagged per-step outcomes plus the aggregate status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub organization_id: OrgId,
    pub status: ProvisionStatus,
    pub outcomes: Vec<StepOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ProvisionReport {
    pub fn steps_completed(&self) -> Vec<&'static str> {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded)
            .map(|o| o.step.as_str())
            .collect()
    }

    pub fn errors(&self) -> Vec<(&'static str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_deref().map(|e| (o.step.as_str(), e)))
            .collect()
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 100.0;
        }
        let completed = self.outcomes.iter().filter(|o| o.succeeded).count();
        (completed as f64 / self.outcomes.len() as f64) * 100.0
    }
}

/// Options for a provisioning run
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub admin_email: String,
    pub admin_name: String,
    pub welcome_template: String,
}

impl ProvisionOptions {
    pub fn new(admin_email: &str, admin_name: &str) -> Self {
        Self {
            admin_email: admin_email.to_string(),
            admin_name: admin_name.to_string(),
            welcome_template: "organization_welcome".to_string(),
        }
    }
}

/// Options for deprovisioning
#[derive(Debug, Clone, Copy, Default)]
pub struct DeprovisionOptions {
    /// Cancel for good instead of suspending
    pub permanent: bool,
    /// Request a best-effort export before deactivating
    pub backup: bool,
}

/// Orchestrates multi-step tenant setup and teardown.
pub struct Provisioner {
    store: Arc<dyn TenantStore>,
    registry: Arc<TenantRegistry>,
    members: Arc<MemberDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl Provisioner {
    pub fn new(
        store: Arc<dyn TenantStore>,
        registry: Arc<TenantRegistry>,
        members: Arc<MemberDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            registry,
            members,
            notifier,
        }
    }

    /// Bring a newly created organization to an operational state.
    ///
    /// Re-running on an organization that is already `Active` and
    /// verified is a no-op returning `AlreadyProvisioned`, so a retried
    /// call cannot create a second admin member.
    pub async fn provision(&self, org_id: OrgId, options: ProvisionOptions) -> Result<ProvisionReport> {
        let org = self.registry.get(org_id).await?;
        let started_at = Utc::now();

        if org.status == OrgStatus::Active && org.verified {
            info!(org_id = %org_id, "Organization already provisioned, skipping");
            return Ok(ProvisionReport {
                organization_id: org_id,
                status: ProvisionStatus::AlreadyProvisioned,
                outcomes: Vec::new(),
                started_at,
                finished_at: Utc::now(),
            });
        }

        info!(org_id = %org_id, slug = %org.slug, "Starting provisioning");

        let mut outcomes = Vec::with_capacity(ProvisionStep::ALL.len());
        for step in ProvisionStep::ALL {
            let step_started = Utc::now();
            let result = self.run_step(step, org_id, &options).await;

            match &result {
                Ok(()) => debug!(org_id = %org_id, step = %step, "Provisioning step completed"),
                Err(e) => warn!(org_id = %org_id, step = %step, error = %e, "Provisioning step failed"),
            }

            outcomes.push(StepOutcome {
                step,
                succeeded: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
                started_at: step_started,
                finished_at: Utc::now(),
            });
        }

        let completed = outcomes.iter().filter(|o| o.succeeded).count();
        let failed = outcomes.len() - completed;
        let status = if failed == 0 {
            ProvisionStatus::Success
        } else if completed > 0 {
            ProvisionStatus::PartialSuccess
        } else {
            ProvisionStatus::Failed
        };

        let report = ProvisionReport {
            organization_id: org_id,
            status,
            outcomes,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            org_id = %org_id,
            status = %status.as_str(),
            completion = report.completion_percentage(),
            "Provisioning finished"
        );
        Ok(report)
    }

    async fn run_step(&self, step: ProvisionStep, org_id: OrgId, options: &ProvisionOptions) -> Result<()> {
        match step {
            ProvisionStep::CreateAdminMember => {
                self.members
                    .create_in_org(org_id, &options.admin_email, &options.admin_name, OrgRole::Owner)
                    .await?;
                Ok(())
            }
            ProvisionStep::InitializeDefaultSettings => {
                let org = self.registry.get(org_id).await?;
                let mut missing: HashMap<String, serde_json::Value> = HashMap::new();
                for (key, value) in default_settings() {
                    if !org.settings.contains_key(key) {
                        missing.insert(key.to_string(), value);
                    }
                }
                if !missing.is_empty() {
                    self.registry
                        .update(
                            org_id,
                            OrganizationUpdate {
                                settings: Some(missing),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
                Ok(())
            }
            ProvisionStep::ConfigureTierFeatures => {
                let org = self.registry.get(org_id).await?;
                let features: HashMap<String, bool> = org
                    .tier
                    .default_features()
                    .iter()
                    .map(|f| (f.to_string(), true))
                    .collect();
                self.registry
                    .update(
                        org_id,
                        OrganizationUpdate {
                            features: Some(features),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(())
            }
            ProvisionStep::MarkVerified => {
                let org = self
                    .registry
                    .update(
                        org_id,
                        OrganizationUpdate {
                            verified: Some(true),
                            ..Default::default()
                        },
                    )
                    .await?;
                // Verification completes the pending path; trials convert
                // on their own schedule.
                if org.status == OrgStatus::Pending {
                    self.registry.set_status(org_id, OrgStatus::Active).await?;
                }
                Ok(())
            }
            ProvisionStep::SendWelcomeNotification => {
                let org = self.registry.get(org_id).await?;
                self.notifier
                    .send(
                        &options.admin_email,
                        &options.welcome_template,
                        &json!({
                            "organization": org.name,
                            "slug": org.slug,
                            "tier": org.tier.as_str(),
                        }),
                    )
                    .await
                    .map_err(TenantError::from)
            }
        }
    }

    /// Deactivate an organization.
    ///
    /// The soft path suspends; the permanent path cancels and stamps the
    /// deletion marker. The optional backup is best-effort and never
    /// blocks deactivation.
    pub async fn deprovision(&self, org_id: OrgId, options: DeprovisionOptions) -> Result<Organization> {
        let org = self.registry.get(org_id).await?;

        if options.backup {
            if let Err(e) = self.backup(&org).await {
                warn!(org_id = %org_id, error = %e, "Backup failed; continuing deprovision");
            }
        }

        if options.permanent {
            self.registry.set_status(org_id, OrgStatus::Cancelled).await?;
            let mut org = self
                .store
                .get_org(org_id)
                .await?
                .ok_or_else(|| TenantError::NotFound(org_id.to_string()))?;
            org.active = false;
            org.deleted_at = Some(Utc::now());
            org.touch();
            self.store.update_org(&org).await?;

            info!(org_id = %org_id, "Organization permanently deprovisioned");
            Ok(org)
        } else {
            self.registry.set_status(org_id, OrgStatus::Suspended).await?;
            let org = self
                .registry
                .update(
                    org_id,
                    OrganizationUpdate {
                        active: Some(false),
                        ..Default::default()
                    },
                )
                .await?;

            info!(org_id = %org_id, "Organization suspended");
            Ok(org)
        }
    }

    async fn backup(&self, org: &Organization) -> Result<()> {
        let members = self.store.list_members(org.id).await?;
        let invitations = self.store.list_invitations(org.id).await?;

        let export = json!({
            "organization": org,
            "member_count": members.len(),
            "invitation_count": invitations.len(),
        });
        debug!(
            org_id = %org.id,
            bytes = export.to_string().len(),
            "Prepared deprovision backup export"
        );
        Ok(())
    }
}

/// Settings every organization starts with unless already customized
fn default_settings() -> Vec<(&'static str, serde_json::Value)> {
    vec![
        ("timezone", json!("UTC")),
        ("locale", json!("en")),
        ("week_starts_on", json!("monday")),
        ("grading_scale", json!("percentage")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organization::SubscriptionTier;
    use crate::quota::{QuotaEnforcer, ResourceKind};
    use crate::registry::CreateOrganization;
    use crate::store::InMemoryTenantStore;
    use campus_core::traits::LogNotifier;
    use campus_core::{CoreError, MemberId, QuotaAlertConfig};
    use mockall::mock;

    mock! {
        Sender {}

        #[async_trait::async_trait]
        impl Notifier for Sender {
            async fn send(
                &self,
                to: &str,
                template: &str,
                context: &serde_json::Value,
            ) -> campus_core::error::Result<()>;
        }
    }

    struct Fixture {
        store: Arc<InMemoryTenantStore>,
        registry: Arc<TenantRegistry>,
        quota: Arc<QuotaEnforcer>,
        provisioner: Provisioner,
    }

    fn fixture_with_notifier(notifier: Arc<dyn Notifier>) -> Fixture {
        let store = Arc::new(InMemoryTenantStore::new());
        let registry = Arc::new(TenantRegistry::new(store.clone()));
        let quota = Arc::new(QuotaEnforcer::new(store.clone(), QuotaAlertConfig::default()));
        let members = Arc::new(MemberDirectory::new(store.clone(), quota.clone()));
        let provisioner = Provisioner::new(store.clone(), registry.clone(), members, notifier);
        Fixture {
            store,
            registry,
            quota,
            provisioner,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_notifier(Arc::new(LogNotifier))
    }

    async fn make_org(fx: &Fixture, tier: SubscriptionTier) -> OrgId {
        fx.registry
            .create(CreateOrganization::new("Acme School", tier, MemberId::new()))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_provision_runs_all_steps() {
        let fx = fixture();
        let org_id = make_org(&fx, SubscriptionTier::Free).await;

        let report = fx
            .provisioner
            .provision(org_id, ProvisionOptions::new("admin@acme.edu", "Admin"))
            .await
            .unwrap();

        assert_eq!(report.status, ProvisionStatus::Success);
        assert_eq!(report.steps_completed().len(), 5);
        assert_eq!(report.completion_percentage(), 100.0);

        let org = fx.registry.get(org_id).await.unwrap();
        assert!(org.verified);
        assert!(org.has_feature("gradebook"));
        assert!(org.settings.contains_key("timezone"));
        assert_eq!(org.usage_of(ResourceKind::Users), 1);

        // Free tier orgs stay on trial after provisioning
        assert_eq!(org.status, OrgStatus::Trial);
    }

    #[tokio::test]
    async fn test_provision_activates_pending_org() {
        let fx = fixture();
        let org_id = make_org(&fx, SubscriptionTier::Enterprise).await;

        let report = fx
            .provisioner
            .provision(org_id, ProvisionOptions::new("admin@district.org", "Admin"))
            .await
            .unwrap();

        assert_eq!(report.status, ProvisionStatus::Success);
        let org = fx.registry.get(org_id).await.unwrap();
        assert_eq!(org.status, OrgStatus::Active);
        assert!(org.verified);
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let fx = fixture();
        let org_id = make_org(&fx, SubscriptionTier::Enterprise).await;
        let options = ProvisionOptions::new("admin@district.org", "Admin");

        let first = fx.provisioner.provision(org_id, options.clone()).await.unwrap();
        assert_eq!(first.status, ProvisionStatus::Success);

        let second = fx.provisioner.provision(org_id, options.clone()).await.unwrap();
        assert_eq!(second.status, ProvisionStatus::AlreadyProvisioned);
        assert!(second.outcomes.is_empty());

        let third = fx.provisioner.provision(org_id, options).await.unwrap();
        assert_eq!(third.status, ProvisionStatus::AlreadyProvisioned);

        // Exactly one admin member, despite three calls
        let members = fx.store.list_members(org_id).await.unwrap();
        assert_eq!(members.len(), 1);
        let org = fx.registry.get(org_id).await.unwrap();
        assert_eq!(org.usage_of(ResourceKind::Users), 1);
    }

    #[tokio::test]
    async fn test_failed_admin_creation_yields_partial_success() {
        let fx = fixture();
        let org_id = make_org(&fx, SubscriptionTier::Free).await;

        // Fill the users quota so admin creation cannot succeed
        fx.quota.try_increment(org_id, ResourceKind::Users, 5).await.unwrap();

        let report = fx
            .provisioner
            .provision(org_id, ProvisionOptions::new("admin@acme.edu", "Admin"))
            .await
            .unwrap();

        assert_eq!(report.status, ProvisionStatus::PartialSuccess);

        let completed = report.steps_completed();
        assert!(!completed.contains(&"create_admin_member"));
        // Independent steps still ran
        assert!(completed.contains(&"initialize_default_settings"));
        assert!(completed.contains(&"configure_tier_features"));

        let errors = report.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "create_admin_member");
    }

    #[tokio::test]
    async fn test_notifier_failure_is_captured_not_thrown() {
        let mut sender = MockSender::new();
        sender
            .expect_send()
            .returning(|_, _, _| Err(CoreError::Notification("smtp down".to_string())));

        let fx = fixture_with_notifier(Arc::new(sender));
        let org_id = make_org(&fx, SubscriptionTier::Free).await;

        let report = fx
            .provisioner
            .provision(org_id, ProvisionOptions::new("admin@acme.edu", "Admin"))
            .await
            .unwrap();

        assert_eq!(report.status, ProvisionStatus::PartialSuccess);
        assert!(!report.steps_completed().contains(&"send_welcome_notification"));
        assert_eq!(report.steps_completed().len(), 4);
    }

    #[tokio::test]
    async fn test_soft_deprovision_suspends() {
        let fx = fixture();
        let org_id = make_org(&fx, SubscriptionTier::Enterprise).await;
        fx.provisioner
            .provision(org_id, ProvisionOptions::new("admin@district.org", "Admin"))
            .await
            .unwrap();

        let org = fx
            .provisioner
            .deprovision(org_id, DeprovisionOptions { permanent: false, backup: true })
            .await
            .unwrap();

        assert_eq!(org.status, OrgStatus::Suspended);
        assert!(!org.active);
        assert!(org.deleted_at.is_none());

        // Reinstatement stays possible
        fx.registry.set_status(org_id, OrgStatus::Active).await.unwrap();
    }

    #[tokio::test]
    async fn test_permanent_deprovision_cancels_and_stamps_deletion() {
        let fx = fixture();
        let org_id = make_org(&fx, SubscriptionTier::Free).await;

        let org = fx
            .provisioner
            .deprovision(org_id, DeprovisionOptions { permanent: true, backup: false })
            .await
            .unwrap();

        assert_eq!(org.status, OrgStatus::Cancelled);
        assert!(!org.active);
        assert!(org.deleted_at.is_some());

        // Cancelled and soft-deleted: gone from registry lookups
        assert!(matches!(
            fx.registry.get(org_id).await.unwrap_err(),
            TenantError::NotFound(_)
        ));
    }
}
