//! Composition of the alert text sent to contacts.

/// Status line included in every alert.
pub const CALL_INITIATED: &str = "Call Initiated";

/// Build the alert body from the user's template and the episode details.
pub fn compose_alert(
  template: &str,
  user_name: &str,
  call_status: &str,
  address: &str,
  link: &str,
) -> String {
  format!(
    "{template}\n\nUser: {user_name}\nStatus: {call_status}\nLocation: {address}\nLink: {link}"
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::location::LOCATING;

  #[test]
  fn alert_layout() {
    let msg = compose_alert("HELP", "Asha", CALL_INITIATED, "MG Road", LOCATING);
    assert_eq!(
      msg,
      "HELP\n\nUser: Asha\nStatus: Call Initiated\nLocation: MG Road\nLink: Locating..."
    );
  }
}
