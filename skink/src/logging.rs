use skink_msg::Message;

/// One-line summary of a message for log records.
pub(crate) fn msg_summary(msg: &Message) -> String {
  format!("{:?} {:?} {} ({:?}) with {} byte payload",
          msg.code.kind(),
          msg.ty,
          msg.code,
          msg.id,
          msg.payload().len())
}
