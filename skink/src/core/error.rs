use skink_msg::to_bytes::MessageToBytesError;

/// The context that an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
  /// We were polling for inbound traffic
  Polling,
  /// We were sending a message
  SendingMessage,
  /// We were touching the file system
  FileIo,
}

impl When {
  /// Construct a specific error from the context the error occurred in
  pub fn what<SockError, FsError>(self,
                                  what: What<SockError, FsError>)
                                  -> Error<SockError, FsError> {
    Error { when: self, what }
  }
}

/// An error encounterable from within [`crate::core::Core`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error<SockError, FsError> {
  /// What happened?
  pub what: What<SockError, FsError>,
  /// What were we doing when it happened?
  pub when: When,
}

/// A contextless error with some additional debug data attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum What<SockError, FsError> {
  /// Some socket operation failed
  SockError(SockError),
  /// Some file operation failed
  FileError(FsError),
  /// Serializing a message to bytes failed
  ToBytes(MessageToBytesError),
  /// The clock failed to provide timing
  ClockError,
  /// All retransmission slots are taken; the CON was not sent
  PendingQueueFull,
  /// A block transfer is already running; one at a time
  TransferActive,
  /// The resource named in a notify call is not observable
  NotObservable,
}
