#[derive(Debug, thiserror::Error)]
pub enum ExampleError {
    #[error(transparent)]
    StdIo(#[from] std::io::Error),
    #[error(transparent)]
    Dmx(#[from] dmx_port::error::Error),
}

pub type ExampleResult<T> = Result<T, ExampleError>;
