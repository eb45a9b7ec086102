mod momentum;

pub use momentum::{rank, score_down, score_up};
