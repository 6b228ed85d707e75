#![forbid(unsafe_code)]

pub use postrpc_macro::procedures;

mod error;
pub use error::{Error, ErrorKind, Result};

mod buffer;
pub use buffer::Buffer;

mod value;
pub use value::{Map, Value};

pub mod transfer;

mod token;
pub use token::{Token, TokenGenerator};

mod msg;
pub use msg::{Envelope, Message, Side};

mod port;
pub use port::{Fault, Port, PortEvent, PortHandler};

pub mod channel;

mod task_supervisor;
pub use task_supervisor::{TaskSupervisor, TaskSupervisorGuard};

mod waiter;
pub use waiter::{Waiter, WaiterCleaner};

mod receiver;
pub use receiver::Receiver;

mod emitter;
pub use emitter::{Emitter, Listener};

mod router;
pub use router::{Method, Router};

mod context;

mod client;
pub use client::{CallOptions, Client, ClientConfig, ERROR_EVENT};

mod server;
pub use server::Server;
