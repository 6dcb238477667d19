pub mod block;
pub mod chain;
pub mod constants;
pub mod epoch;
pub mod error;
pub mod genesis;
pub mod identity;
pub mod primitives;
pub mod proof;
pub mod tx;
