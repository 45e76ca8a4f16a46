mod api_server;

pub use api_server::{ApyQuery, ApiServer, ApiState, ClearQuery};
