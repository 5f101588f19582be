// Copyright 2019-2022 Clemens Lutz
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::result;

pub type Result<T> = result::Result<T, Error>;

/// Error taxonomy for the hybrid executor.
///
/// `Precondition` and `ResourceExhausted` cover the fatal-by-design cases
/// from the error handling section: a non-resident GPU segment reached by
/// a kernel indicates a planner bug, and an offset buffer or hash table
/// that overflows its worst-case capacity indicates a sizing bug. Neither
/// is recoverable; both are surfaced as `Err` instead of `abort()` so that
/// an embedding driver decides how to report them.
#[derive(Debug)]
pub enum ErrorKind {
    /// A GPU pointer was requested for a segment that isn't resident on
    /// the device, or a required pointer was null.
    Precondition(String),

    /// A CUDA allocation, kernel launch, or stream synchronization failed.
    Device(String),

    /// An offset stream or hash table exceeded its worst-case capacity.
    ResourceExhausted(String),

    /// A caller passed a combination of arguments the executor can't act on.
    InvalidArgument(String),

    /// A lower-level CUDA error, kept for its `Display` message.
    Cuda(String),
}

#[derive(Debug)]
pub struct Error(ErrorKind);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ErrorKind::Precondition(msg) => write!(f, "precondition violated: {}", msg),
            ErrorKind::Device(msg) => write!(f, "device error: {}", msg),
            ErrorKind::ResourceExhausted(msg) => write!(f, "resource exhausted: {}", msg),
            ErrorKind::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            ErrorKind::Cuda(msg) => write!(f, "CUDA error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error(kind)
    }
}

impl From<rustacuda::error::CudaError> for Error {
    fn from(e: rustacuda::error::CudaError) -> Error {
        Error(ErrorKind::Cuda(e.to_string()))
    }
}
