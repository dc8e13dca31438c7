pub mod base_gen;
pub mod check;
pub mod promote;
pub mod refresh;
pub mod sync;
