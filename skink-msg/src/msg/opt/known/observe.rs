/// Registration intent carried in the Observe option of a GET request.
///
/// RFC 7641 overloads the option value: on a request, `0` means
/// "put me on this resource's observer list" and `1` means "take me
/// off it"; on a response it is the notification sequence number
/// instead. This type only models the request side; use
/// `Message::observe` directly when you need the raw sequence
/// number.
#[derive(Hash, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Action {
  /// Observe=0, subscribe
  Register,
  /// Observe=1, unsubscribe
  Deregister,
}

impl Action {
  /// The option value encoding this action.
  pub fn value(self) -> u32 {
    matches!(self, Action::Deregister) as u32
  }

  /// Classify a request's Observe value; anything other than 0 or 1
  /// carries no registration meaning.
  pub fn of_value(value: u32) -> Option<Self> {
    [Action::Register, Action::Deregister].into_iter()
                                          .find(|action| action.value() == value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn value_roundtrip() {
    assert_eq!(Action::of_value(0), Some(Action::Register));
    assert_eq!(Action::of_value(1), Some(Action::Deregister));
    assert_eq!(Action::of_value(Action::Register.value()),
               Some(Action::Register));

    // sequence numbers on notifications are not actions
    assert_eq!(Action::of_value(2), None);
    assert_eq!(Action::of_value(0xFF_FFFF), None);
  }
}
