//! Mocks shared by the job tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leasewarden_core::error::{LeaseError, Result};
use leasewarden_core::traits::{
    ControlPlane, MailTransport, ReminderContext, RenderedMessage, SideChannel, TemplateRenderer,
    VersionSource,
};
use leasewarden_core::types::{ManagedResource, ResourceStatus};
use leasewarden_db::LeaseDb;

use crate::audit::AuditLogger;
use crate::context::{JobContext, JobDeps, JobSettings};
use crate::control::JobControl;
use crate::kind::JobKind;
use crate::run_id::RunId;

/// Records calls; answers with a canned error per external id.
#[derive(Default)]
pub struct MockControlPlane {
    pub suspended: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub failures: Mutex<HashMap<String, LeaseError>>,
    pub missing: Mutex<Vec<String>>,
}

impl MockControlPlane {
    pub fn fail(&self, external_id: &str, status: u16, body: &str) {
        self.failures.lock().unwrap().insert(
            external_id.to_string(),
            LeaseError::ControlPlane {
                status,
                body: body.to_string(),
            },
        );
    }

    fn outcome(&self, external_id: &str) -> Result<()> {
        if self.missing.lock().unwrap().iter().any(|m| m == external_id) {
            return Err(LeaseError::ControlPlaneNotFound(external_id.to_string()));
        }
        match self.failures.lock().unwrap().get(external_id) {
            Some(LeaseError::ControlPlane { status, body }) => Err(LeaseError::ControlPlane {
                status: *status,
                body: body.clone(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    fn name(&self) -> &str {
        "mock"
    }

    async fn suspend(&self, external_id: &str) -> Result<()> {
        self.outcome(external_id)?;
        self.suspended.lock().unwrap().push(external_id.to_string());
        Ok(())
    }

    async fn delete(&self, external_id: &str) -> Result<()> {
        self.outcome(external_id)?;
        self.deleted.lock().unwrap().push(external_id.to_string());
        Ok(())
    }
}

/// Mailbox that can be switched to failing.
#[derive(Default)]
pub struct MockMail {
    pub sent: Mutex<Vec<(String, String)>>,
    pub attempts: Mutex<u32>,
    pub failing: Mutex<bool>,
}

#[async_trait]
impl MailTransport for MockMail {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<String> {
        *self.attempts.lock().unwrap() += 1;
        if *self.failing.lock().unwrap() {
            return Err(LeaseError::Mail("connection refused".into()));
        }
        self.sent.lock().unwrap().push((to.to_string(), subject.to_string()));
        Ok("250 OK".into())
    }
}

pub struct PlainTemplates;

impl TemplateRenderer for PlainTemplates {
    fn render(&self, ctx: &ReminderContext<'_>) -> Result<RenderedMessage> {
        if ctx.resource.name.is_empty() {
            return Err(LeaseError::Render("no name".into()));
        }
        Ok(RenderedMessage {
            subject: format!("{} {}", ctx.kind, ctx.resource.name),
            html: format!("<p>{}</p>", ctx.delete_at.to_rfc3339()),
        })
    }
}

#[derive(Default)]
pub struct MockSideChannel {
    pub messages: Mutex<Vec<String>>,
    pub down: Mutex<bool>,
}

#[async_trait]
impl SideChannel for MockSideChannel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, message: &str) -> bool {
        if *self.down.lock().unwrap() {
            return false;
        }
        self.messages.lock().unwrap().push(message.to_string());
        true
    }
}

pub struct FixedVersion(pub Mutex<String>);

#[async_trait]
impl VersionSource for FixedVersion {
    async fn latest_version(&self) -> Result<String> {
        Ok(self.0.lock().unwrap().clone())
    }
}

/// A wired set of mocks over a database, in-memory unless given one.
pub struct Harness {
    pub db: Arc<LeaseDb>,
    pub control_plane: Arc<MockControlPlane>,
    pub mail: Arc<MockMail>,
    pub side_channel: Arc<MockSideChannel>,
    pub version: Arc<FixedVersion>,
    pub deps: Arc<JobDeps>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(JobSettings {
            throttle: Duration::ZERO,
            ..JobSettings::default()
        })
    }

    pub fn with_settings(settings: JobSettings) -> Self {
        Self::with_db(Arc::new(LeaseDb::open_in_memory().unwrap()), settings)
    }

    /// Same mocks over a caller-supplied database.
    pub fn with_db(db: Arc<LeaseDb>, settings: JobSettings) -> Self {
        let control_plane = Arc::new(MockControlPlane::default());
        let mail = Arc::new(MockMail::default());
        let side_channel = Arc::new(MockSideChannel::default());
        let version = Arc::new(FixedVersion(Mutex::new("2.0.9".into())));
        let deps = Arc::new(JobDeps {
            db: db.clone(),
            control_plane: control_plane.clone(),
            mail: mail.clone(),
            templates: Arc::new(PlainTemplates),
            side_channel: Some(side_channel.clone()),
            version_source: Some(version.clone()),
            settings,
        });
        Self {
            db,
            control_plane,
            mail,
            side_channel,
            version,
            deps,
        }
    }

    /// Insert a resource with an external id derived from its name.
    pub fn resource(&self, name: &str, status: ResourceStatus, expires_at: DateTime<Utc>) -> ManagedResource {
        let r = ManagedResource::new(name, "user-1", "owner@example.com", expires_at)
            .with_external_id(&format!("ext-{name}"))
            .with_status(status);
        self.db.insert_resource(&r).unwrap();
        r
    }

    pub fn context(&self, kind: JobKind) -> JobContext {
        let run_id = RunId::generate(kind.name());
        let log = AuditLogger::new(self.db.clone()).for_run(kind.name(), run_id.as_str());
        JobContext::new(kind, run_id, Utc::now(), log, JobControl::detached())
    }

    pub fn status_of(&self, r: &ManagedResource) -> ResourceStatus {
        self.db.get_resource(&r.id).unwrap().unwrap().status
    }
}
