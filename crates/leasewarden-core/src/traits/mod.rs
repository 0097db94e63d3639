//! Seams for every external collaborator the lifecycle jobs talk to.

pub mod control_plane;
pub mod mail;
pub mod side_channel;
pub mod template;
pub mod version;

pub use control_plane::ControlPlane;
pub use mail::MailTransport;
pub use side_channel::SideChannel;
pub use template::{ReminderContext, RenderedMessage, TemplateRenderer};
pub use version::VersionSource;
