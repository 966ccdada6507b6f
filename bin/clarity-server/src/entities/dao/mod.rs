pub mod corpus;
pub mod message;
pub mod profile;
pub mod session;
pub mod therapy;

pub use corpus::Conversation;
pub use message::{ChatMessage, NewMessage};
pub use profile::Profile;
pub use session::ChatSession;
pub use therapy::TherapySession;
