mod chromium;
mod error;
mod session;

pub use chromium::{ChromiumLauncher, ChromiumSession};
pub use error::{BrowserError, BrowserResult};
pub use session::{BrowserSession, ElementId, TabHandle};
