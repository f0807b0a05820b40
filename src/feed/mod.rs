mod gateway;
mod model;
mod paths;
mod read;
mod write;

pub use gateway::FeedGateway;
