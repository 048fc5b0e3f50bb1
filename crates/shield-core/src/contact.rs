//! Trusted contacts and phone-number normalization.
//!
//! A contact is immutable once created: editing is expressed as removal plus
//! re-creation. Phone numbers are stored in a single canonical E.164 form so
//! that uniqueness can be checked by plain string comparison.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Minimum length of a contact's display name, after trimming.
pub const MIN_NAME_LEN: usize = 2;

/// Fixed id of the seeded emergency-service contact, so the seed can be
/// removed before the book was ever saved.
pub const SEED_CONTACT_ID: Uuid = Uuid::from_u128(0x0000_0112);

// ─── Phone numbers ───────────────────────────────────────────────────────────

/// Regional dialing rules used to canonicalise user-typed numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneRules {
  /// Country calling code without the leading `+`, e.g. `"91"`.
  pub country_code:   String,
  /// Number of digits in a national subscriber number.
  pub national_len:   usize,
  /// Allowed leading digits of a national mobile number. Empty allows any.
  pub mobile_leading: String,
}

impl Default for PhoneRules {
  fn default() -> Self {
    Self {
      country_code:   "91".into(),
      national_len:   10,
      mobile_leading: "6789".into(),
    }
  }
}

/// A phone number in canonical form: either E.164 (`+<cc><subscriber>`) or a
/// short emergency-service code such as `112`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
  /// Normalise a user-typed number according to `rules`.
  ///
  /// Accepts `+<cc>…`, `00<cc>…`, bare national numbers, national numbers
  /// with a trunk `0`, and national numbers prefixed with the country code.
  pub fn parse(raw: &str, rules: &PhoneRules) -> Result<Self> {
    let compact: String = raw
      .chars()
      .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
      .collect();

    let invalid = || Error::InvalidPhone(raw.to_string());

    let (international, digits) = if let Some(rest) = compact.strip_prefix('+') {
      (true, rest)
    } else if let Some(rest) = compact.strip_prefix("00") {
      (true, rest)
    } else {
      (false, compact.as_str())
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
      return Err(invalid());
    }

    let cc = rules.country_code.as_str();
    let national = if international {
      match digits.strip_prefix(cc) {
        Some(national) => national,
        // Foreign numbers are accepted as-is within the E.164 length limit.
        None if (8..=15).contains(&digits.len()) => {
          return Ok(Self(format!("+{digits}")));
        }
        None => return Err(invalid()),
      }
    } else if digits.len() == rules.national_len {
      digits
    } else if digits.len() == rules.national_len + 1 && digits.starts_with('0') {
      &digits[1..]
    } else if digits.len() == cc.len() + rules.national_len && digits.starts_with(cc) {
      &digits[cc.len()..]
    } else {
      return Err(invalid());
    };

    if national.len() != rules.national_len {
      return Err(invalid());
    }
    let leading = national.chars().next().ok_or_else(invalid)?;
    if !rules.mobile_leading.is_empty() && !rules.mobile_leading.contains(leading) {
      return Err(invalid());
    }
    if national.chars().all(|c| c == leading) {
      return Err(Error::DummyNumber(format!("+{cc}{national}")));
    }

    Ok(Self(format!("+{cc}{national}")))
  }

  /// A short emergency-service code (2–6 digits), dialed verbatim.
  pub fn service(code: &str) -> Result<Self> {
    if (2..=6).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_digit()) {
      Ok(Self(code.to_string()))
    } else {
      Err(Error::InvalidPhone(code.to_string()))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PhoneNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Contacts ────────────────────────────────────────────────────────────────

/// A trusted recipient of SOS alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
  pub contact_id: Uuid,
  pub name:       String,
  pub phone:      PhoneNumber,
}

/// Input to [`ContactBook::add`]; the phone is still in user-typed form.
#[derive(Debug, Clone, Deserialize)]
pub struct NewContact {
  pub name:  String,
  pub phone: String,
}

/// One user's set of trusted contacts.
///
/// Invariant: no two contacts share a normalised phone number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactBook {
  contacts: Vec<Contact>,
}

impl ContactBook {
  /// A book holding only the national emergency service.
  pub fn seeded(emergency_number: &str) -> Result<Self> {
    Ok(Self {
      contacts: vec![Contact {
        contact_id: SEED_CONTACT_ID,
        name:       "National Emergency Service".into(),
        phone:      PhoneNumber::service(emergency_number)?,
      }],
    })
  }

  /// Validate and append a contact. The book is unchanged on error.
  pub fn add(&mut self, input: NewContact, rules: &PhoneRules) -> Result<Contact> {
    let name = input.name.trim();
    if name.chars().count() < MIN_NAME_LEN {
      return Err(Error::NameTooShort { min: MIN_NAME_LEN });
    }

    let phone = PhoneNumber::parse(&input.phone, rules)?;
    if self.contacts.iter().any(|c| c.phone == phone) {
      return Err(Error::DuplicatePhone(phone.to_string()));
    }

    let contact = Contact {
      contact_id: Uuid::new_v4(),
      name:       name.to_string(),
      phone,
    };
    self.contacts.push(contact.clone());
    Ok(contact)
  }

  /// Remove a contact by id and return it.
  pub fn remove(&mut self, contact_id: Uuid) -> Result<Contact> {
    let idx = self
      .contacts
      .iter()
      .position(|c| c.contact_id == contact_id)
      .ok_or(Error::ContactNotFound(contact_id))?;
    Ok(self.contacts.remove(idx))
  }

  pub fn contacts(&self) -> &[Contact] { &self.contacts }

  pub fn len(&self) -> usize { self.contacts.len() }

  pub fn is_empty(&self) -> bool { self.contacts.is_empty() }
}
