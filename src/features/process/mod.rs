pub mod compositor;
pub mod handler;
pub mod remover;
pub mod types;
pub mod validator;

pub use compositor::Compositor;
pub use handler::create_process_router;
pub use remover::{BackgroundRemover, BorderKeyRemover, RemoteRemover, build_remover};
pub use types::RawUpload;
