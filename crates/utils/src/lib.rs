pub mod clock;
pub mod generate;

pub use clock::{Clock, ManualClock, SystemClock};
pub use generate::generate_token_id;
