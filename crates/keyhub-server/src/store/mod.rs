pub mod credentials;
pub mod model;
pub mod view;

pub use credentials::{AdminCredential, CredentialFile};
pub use model::{Account, ServerInfo, ServerSummary, StatusRecord};
pub use view::{AccountView, Snapshot};
