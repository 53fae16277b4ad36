//! The closed set of attribute field types and their validators.
//!
//! Two independent checks live here:
//!
//! - [`validate_definition`] runs when a schema author creates or edits an
//!   attribute definition. It fails fast on the first structural problem.
//! - [`validate_attributes`] runs when a CI is written. It never stops early:
//!   every offending field contributes one [`FieldError`].
//!
//! Both dispatch on [`FieldType`] with exhaustive matches, so a new field type
//! cannot be added without deciding how each validator treats it.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
  Error, FieldError, Result,
  schema::{AttrDef, NewAttrDef},
};

// ─── Field type ──────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldType {
  String,
  Number,
  Boolean,
  Enum,
  MultiEnum,
  Date,
  Ip,
  Mac,
  Hostname,
  Cidr,
  Port,
  Regex,
  Json,
}

impl FieldType {
  /// Types whose values are strings and may carry length/pattern limits.
  pub fn is_string_like(self) -> bool {
    match self {
      Self::String
      | Self::Hostname
      | Self::Mac
      | Self::Ip
      | Self::Cidr
      | Self::Regex => true,
      Self::Number
      | Self::Boolean
      | Self::Enum
      | Self::MultiEnum
      | Self::Date
      | Self::Port
      | Self::Json => false,
    }
  }

  /// Types that may carry numeric bounds, step, precision and scale.
  pub fn is_numeric(self) -> bool {
    match self {
      Self::Number | Self::Port => true,
      Self::String
      | Self::Boolean
      | Self::Enum
      | Self::MultiEnum
      | Self::Date
      | Self::Ip
      | Self::Mac
      | Self::Hostname
      | Self::Cidr
      | Self::Regex
      | Self::Json => false,
    }
  }

  fn requires_enum_values(self) -> bool {
    matches!(self, Self::Enum | Self::MultiEnum)
  }
}

// ─── Structural validation ───────────────────────────────────────────────────

/// Check an attribute definition for structural consistency.
pub fn validate_definition(def: &NewAttrDef) -> Result<()> {
  if def.key.trim().is_empty() || def.label.trim().is_empty() {
    return Err(Error::bad_request("attribute key and label are required"));
  }
  if !is_camel_case_key(def.key.trim()) {
    return Err(Error::bad_request(format!(
      "attribute key {:?} must be camelCase",
      def.key
    )));
  }

  let ft = def.field_type;
  check_enum_values(ft, def.enum_values.as_deref())?;

  if let Some(pattern) = &def.pattern {
    Regex::new(pattern)
      .map_err(|_| Error::bad_request("pattern must be a valid regex"))?;
  }
  if ft == FieldType::Regex && def.pattern.is_none() {
    return Err(Error::bad_request("pattern is required for regex fields"));
  }

  if !ft.is_string_like() {
    if def.min_len.is_some() || def.max_len.is_some() {
      return Err(Error::bad_request(
        "length constraints only apply to string fields",
      ));
    }
    if def.pattern.is_some() {
      return Err(Error::bad_request("pattern only applies to string fields"));
    }
  }

  let has_numeric = def.min_value.is_some()
    || def.max_value.is_some()
    || def.step_value.is_some()
    || def.precision.is_some()
    || def.scale.is_some();
  if has_numeric && !ft.is_numeric() {
    return Err(Error::bad_request(
      "numeric constraints only apply to number fields",
    ));
  }

  if let (Some(min), Some(max)) = (def.min_value, def.max_value)
    && min > max
  {
    return Err(Error::bad_request(
      "min value must be less than or equal to max value",
    ));
  }
  if let Some(step) = def.step_value
    && step <= 0.0
  {
    return Err(Error::bad_request("step value must be positive"));
  }
  if let Some(precision) = def.precision {
    if precision == 0 {
      return Err(Error::bad_request("precision must be positive"));
    }
    if let Some(scale) = def.scale
      && scale > precision
    {
      return Err(Error::bad_request("scale must be between 0 and precision"));
    }
  }
  if let (Some(min), Some(max)) = (def.min_len, def.max_len)
    && min > max
  {
    return Err(Error::bad_request(
      "min length must be less than or equal to max length",
    ));
  }

  Ok(())
}

fn is_camel_case_key(key: &str) -> bool {
  let mut chars = key.chars();
  matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
    && chars.all(|c| c.is_ascii_alphanumeric())
}

fn check_enum_values(ft: FieldType, values: Option<&[String]>) -> Result<()> {
  let blank = values.is_some_and(|vs| vs.iter().any(|v| v.trim().is_empty()));
  if ft.requires_enum_values() && values.is_none_or(<[String]>::is_empty) {
    return Err(Error::bad_request("enum values required"));
  }
  if blank {
    return Err(Error::bad_request("enum values must be non-empty strings"));
  }
  Ok(())
}

// ─── Value validation ────────────────────────────────────────────────────────

/// Validate a full attribute payload against a version's definitions.
///
/// Missing, `null` or empty-string values fail only for required definitions.
/// Payload keys without a definition are ignored.
pub fn validate_attributes(
  defs: &[AttrDef],
  attrs: &Map<String, Value>,
) -> Result<()> {
  let mut errors = Vec::new();

  for def in defs {
    match attrs.get(&def.key) {
      None | Some(Value::Null) => {
        if def.required {
          errors.push(FieldError::new(&def.key, "Required field"));
        }
      }
      Some(Value::String(s)) if s.is_empty() => {
        if def.required {
          errors.push(FieldError::new(&def.key, "Required field"));
        }
      }
      Some(value) => {
        if let Err(message) = validate_value(def, value) {
          errors.push(FieldError::new(&def.key, message));
        }
      }
    }
  }

  if errors.is_empty() { Ok(()) } else { Err(Error::InvalidAttributes(errors)) }
}

/// Validate one present value against its definition.
pub fn validate_value(def: &AttrDef, value: &Value) -> Result<(), &'static str> {
  match def.field_type {
    FieldType::String => {
      let s = value.as_str().ok_or("Must be a string")?;
      check_string(def, s)
    }
    FieldType::Number => check_number(def, value),
    FieldType::Boolean => {
      value.as_bool().map(|_| ()).ok_or("Must be a boolean")
    }
    FieldType::Enum => {
      let s = value.as_str().ok_or("Must be a string")?;
      if is_enum_member(def, s) { Ok(()) } else { Err("Invalid value") }
    }
    FieldType::MultiEnum => {
      let items = value.as_array().ok_or("Must be a list")?;
      let strings = items
        .iter()
        .map(Value::as_str)
        .collect::<Option<Vec<_>>>()
        .ok_or("Must be a list of strings")?;
      if strings.iter().all(|s| is_enum_member(def, s)) {
        Ok(())
      } else {
        Err("Invalid value")
      }
    }
    FieldType::Date => {
      let s = value.as_str().ok_or("Must be a date string")?;
      if is_date(s) { Ok(()) } else { Err("Invalid date") }
    }
    FieldType::Ip => {
      let s = value.as_str().ok_or("Must be a string")?;
      if !is_ipv4(s) {
        return Err("Invalid IP");
      }
      check_string(def, s)
    }
    FieldType::Mac => {
      let s = value.as_str().ok_or("Must be a string")?;
      if !is_mac(s) {
        return Err("Invalid MAC");
      }
      check_string(def, s)
    }
    FieldType::Hostname => {
      let s = value.as_str().ok_or("Must be a string")?;
      if !is_hostname(s) {
        return Err("Invalid hostname");
      }
      check_string(def, s)
    }
    FieldType::Cidr => {
      let s = value.as_str().ok_or("Must be a string")?;
      if !is_cidr(s) {
        return Err("Invalid CIDR");
      }
      check_string(def, s)
    }
    FieldType::Port => check_port(def, value),
    FieldType::Regex => {
      let s = value.as_str().ok_or("Must be a string")?;
      let pattern = def.pattern.as_deref().ok_or("Pattern is required")?;
      let re = Regex::new(pattern).map_err(|_| "Invalid pattern")?;
      if !re.is_match(s) {
        return Err("Value does not match pattern");
      }
      check_string(def, s)
    }
    FieldType::Json => {
      if value.is_object() { Ok(()) } else { Err("Must be a JSON object") }
    }
  }
}

fn is_enum_member(def: &AttrDef, s: &str) -> bool {
  def
    .enum_values
    .as_ref()
    .is_none_or(|values| values.iter().any(|v| v == s))
}

/// Length bounds and optional pattern shared by every string-like type.
fn check_string(def: &AttrDef, s: &str) -> Result<(), &'static str> {
  let len = s.chars().count();
  if def.min_len.is_some_and(|min| len < min as usize) {
    return Err("Value too short");
  }
  if def.max_len.is_some_and(|max| len > max as usize) {
    return Err("Value too long");
  }
  if let Some(pattern) = &def.pattern {
    let re = Regex::new(pattern).map_err(|_| "Invalid pattern")?;
    if !re.is_match(s) {
      return Err("Value does not match pattern");
    }
  }
  Ok(())
}

fn check_number(def: &AttrDef, value: &Value) -> Result<(), &'static str> {
  let Value::Number(n) = value else {
    return Err("Must be a number");
  };
  let x = n.as_f64().filter(|x| x.is_finite()).ok_or("Must be a number")?;
  if def.min_value.is_some_and(|min| x < min) {
    return Err("Value below minimum");
  }
  if def.max_value.is_some_and(|max| x > max) {
    return Err("Value above maximum");
  }
  if let Some(precision) = def.precision {
    let (int_digits, frac_digits) = decimal_digits(&plain_decimal(n));
    if int_digits + frac_digits > precision as usize {
      return Err("Invalid precision/scale");
    }
    if def.scale.is_some_and(|scale| frac_digits > scale as usize) {
      return Err("Invalid precision/scale");
    }
  }
  Ok(())
}

fn check_port(def: &AttrDef, value: &Value) -> Result<(), &'static str> {
  let Value::Number(n) = value else {
    return Err("Must be a number");
  };
  let x = n.as_f64().ok_or("Must be a number")?;
  if x.fract() != 0.0 {
    return Err("Must be an integer");
  }
  let min = def.min_value.unwrap_or(1.0);
  let max = def.max_value.unwrap_or(65535.0);
  if x < min || x > max {
    return Err("Invalid port");
  }
  Ok(())
}

// ─── Decimal representation ──────────────────────────────────────────────────

/// Render a JSON number as a plain decimal string, expanding any exponent
/// (`1e-7` becomes `0.0000001`).
fn plain_decimal(n: &Number) -> String {
  let raw = n.to_string();
  let Some(idx) = raw.find(['e', 'E']) else {
    return raw;
  };
  let Ok(exp) = raw[idx + 1..].parse::<i32>() else {
    return raw;
  };
  let mantissa = &raw[..idx];
  let (sign, mantissa) = match mantissa.strip_prefix('-') {
    Some(m) => ("-", m),
    None => ("", mantissa),
  };
  let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
  let digits = format!("{int}{frac}");
  let point = int.len() as i64 + i64::from(exp);

  if point <= 0 {
    let zeros = "0".repeat(point.unsigned_abs() as usize);
    format!("{sign}0.{zeros}{digits}")
  } else if point as usize >= digits.len() {
    let zeros = "0".repeat(point as usize - digits.len());
    format!("{sign}{digits}{zeros}")
  } else {
    let point = point as usize;
    format!("{sign}{}.{}", &digits[..point], &digits[point..])
  }
}

/// `(integer digits, fractional digits)` of a plain decimal string. Trailing
/// fractional zeros are not significant.
fn decimal_digits(plain: &str) -> (usize, usize) {
  let unsigned = plain.trim_start_matches('-');
  let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
  (int.len(), frac.trim_end_matches('0').len())
}

// ─── Network formats ─────────────────────────────────────────────────────────

fn is_ipv4(s: &str) -> bool {
  let parts: Vec<&str> = s.split('.').collect();
  parts.len() == 4
    && parts.iter().all(|part| {
      !part.is_empty()
        && part.len() <= 3
        && part.bytes().all(|b| b.is_ascii_digit())
        && part.parse::<u16>().is_ok_and(|octet| octet <= 255)
    })
}

fn is_mac(s: &str) -> bool {
  let bytes = s.as_bytes();
  bytes.len() == 17
    && bytes.iter().enumerate().all(|(i, b)| {
      if i % 3 == 2 { *b == b':' || *b == b'-' } else { b.is_ascii_hexdigit() }
    })
}

fn is_hostname(s: &str) -> bool {
  s.len() <= 253
    && s.split('.').all(|label| {
      let bytes = label.as_bytes();
      (1..=63).contains(&bytes.len())
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
        && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
    })
}

fn is_cidr(s: &str) -> bool {
  let Some((ip, prefix)) = s.split_once('/') else {
    return false;
  };
  is_ipv4(ip)
    && !prefix.is_empty()
    && prefix.bytes().all(|b| b.is_ascii_digit())
    && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
}

fn is_date(s: &str) -> bool {
  DateTime::parse_from_rfc3339(s).is_ok()
    || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
    || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
    || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").is_ok()
    || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use strum::IntoEnumIterator;
  use uuid::Uuid;

  use super::*;

  fn def(input: NewAttrDef) -> AttrDef { input.into_def(Uuid::new_v4()) }

  fn check(input: NewAttrDef, value: Value) -> Result<(), &'static str> {
    validate_value(&def(input), &value)
  }

  fn payload(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
  }

  // ── Structural ───────────────────────────────────────────────────────────

  #[test]
  fn number_with_pattern_is_rejected() {
    let mut d = NewAttrDef::new("cores", "Cores", FieldType::Number);
    d.pattern = Some("^[0-9]+$".into());
    assert!(matches!(validate_definition(&d), Err(Error::BadRequest(_))));
  }

  #[test]
  fn enum_requires_values() {
    let d = NewAttrDef::new("tier", "Tier", FieldType::Enum);
    assert!(validate_definition(&d).is_err());

    let mut d = NewAttrDef::new("tier", "Tier", FieldType::MultiEnum);
    d.enum_values = Some(vec![]);
    assert!(validate_definition(&d).is_err());

    d.enum_values = Some(vec!["gold".into(), " ".into()]);
    assert!(validate_definition(&d).is_err());

    d.enum_values = Some(vec!["gold".into(), "silver".into()]);
    assert!(validate_definition(&d).is_ok());
  }

  #[test]
  fn regex_requires_compilable_pattern() {
    let mut d = NewAttrDef::new("serial", "Serial", FieldType::Regex);
    assert!(validate_definition(&d).is_err());
    d.pattern = Some("([a-z".into());
    assert!(validate_definition(&d).is_err());
    d.pattern = Some("^SN-[0-9]{4}$".into());
    assert!(validate_definition(&d).is_ok());
  }

  #[test]
  fn length_bounds_only_for_string_like() {
    let mut d = NewAttrDef::new("enabled", "Enabled", FieldType::Boolean);
    d.max_len = Some(4);
    assert!(validate_definition(&d).is_err());

    let mut d = NewAttrDef::new("fqdn", "FQDN", FieldType::Hostname);
    d.min_len = Some(10);
    d.max_len = Some(4);
    assert!(validate_definition(&d).is_err());
    d.max_len = Some(40);
    assert!(validate_definition(&d).is_ok());
  }

  #[test]
  fn numeric_constraints_only_for_numbers() {
    let mut d = NewAttrDef::new("owner", "Owner", FieldType::String);
    d.min_value = Some(1.0);
    assert!(validate_definition(&d).is_err());

    let mut d = NewAttrDef::new("ram", "RAM", FieldType::Number);
    d.min_value = Some(10.0);
    d.max_value = Some(1.0);
    assert!(validate_definition(&d).is_err());

    let mut d = NewAttrDef::new("ram", "RAM", FieldType::Number);
    d.step_value = Some(0.0);
    assert!(validate_definition(&d).is_err());

    let mut d = NewAttrDef::new("ram", "RAM", FieldType::Number);
    d.precision = Some(4);
    d.scale = Some(5);
    assert!(validate_definition(&d).is_err());
    d.scale = Some(2);
    assert!(validate_definition(&d).is_ok());
  }

  #[test]
  fn key_must_be_camel_case() {
    let d = NewAttrDef::new("Owner", "Owner", FieldType::String);
    assert!(validate_definition(&d).is_err());
    let d = NewAttrDef::new("owner_team", "Owner", FieldType::String);
    assert!(validate_definition(&d).is_err());
    let d = NewAttrDef::new("ownerTeam", "Owner", FieldType::String);
    assert!(validate_definition(&d).is_ok());
  }

  #[test]
  fn every_field_type_has_a_plain_valid_definition() {
    for ft in FieldType::iter() {
      let mut d = NewAttrDef::new("field", "Field", ft);
      match ft {
        FieldType::Enum | FieldType::MultiEnum => {
          d.enum_values = Some(vec!["a".into()]);
        }
        FieldType::Regex => d.pattern = Some(".*".into()),
        _ => {}
      }
      assert!(validate_definition(&d).is_ok(), "{ft}");
    }
  }

  // ── Values ───────────────────────────────────────────────────────────────

  #[test]
  fn string_constraints() {
    let mut d = NewAttrDef::new("code", "Code", FieldType::String);
    d.min_len = Some(2);
    d.max_len = Some(4);
    d.pattern = Some("^[A-Z]+$".into());
    assert_eq!(check(d.clone(), json!(5)), Err("Must be a string"));
    assert_eq!(check(d.clone(), json!("A")), Err("Value too short"));
    assert_eq!(check(d.clone(), json!("ABCDE")), Err("Value too long"));
    assert_eq!(check(d.clone(), json!("ab")), Err("Value does not match pattern"));
    assert_eq!(check(d, json!("ABC")), Ok(()));
  }

  #[test]
  fn number_bounds_and_precision() {
    let mut d = NewAttrDef::new("price", "Price", FieldType::Number);
    d.min_value = Some(0.0);
    d.max_value = Some(1000.0);
    d.precision = Some(5);
    d.scale = Some(2);
    assert_eq!(check(d.clone(), json!("12")), Err("Must be a number"));
    assert_eq!(check(d.clone(), json!(-1)), Err("Value below minimum"));
    assert_eq!(check(d.clone(), json!(1000.5)), Err("Value above maximum"));
    assert_eq!(check(d.clone(), json!(12.345)), Err("Invalid precision/scale"));
    assert_eq!(check(d.clone(), json!(999.99)), Ok(()));
    assert_eq!(check(d, json!(12.0)), Ok(()));
  }

  #[test]
  fn precision_uses_plain_decimal_for_exponents() {
    let mut d = NewAttrDef::new("tiny", "Tiny", FieldType::Number);
    d.precision = Some(8);
    d.scale = Some(7);
    assert_eq!(check(d.clone(), json!(1e-7)), Ok(()));
    d.scale = Some(6);
    assert_eq!(check(d, json!(1e-7)), Err("Invalid precision/scale"));
  }

  #[test]
  fn plain_decimal_expansion() {
    let n = |v: f64| Number::from_f64(v).unwrap_or_else(|| Number::from(0));
    assert_eq!(plain_decimal(&n(1e-7)), "0.0000001");
    assert_eq!(plain_decimal(&n(1.5e21)), "1500000000000000000000");
    assert_eq!(decimal_digits("-12.500"), (2, 1));
  }

  #[test]
  fn boolean_enum_and_multi_enum() {
    let b = NewAttrDef::new("managed", "Managed", FieldType::Boolean);
    assert_eq!(check(b.clone(), json!("true")), Err("Must be a boolean"));
    assert_eq!(check(b, json!(false)), Ok(()));

    let mut e = NewAttrDef::new("tier", "Tier", FieldType::Enum);
    e.enum_values = Some(vec!["gold".into(), "silver".into()]);
    assert_eq!(check(e.clone(), json!("bronze")), Err("Invalid value"));
    assert_eq!(check(e.clone(), json!(["gold"])), Err("Must be a string"));
    assert_eq!(check(e.clone(), json!("gold")), Ok(()));

    let mut m = e;
    m.field_type = FieldType::MultiEnum;
    assert_eq!(check(m.clone(), json!("gold")), Err("Must be a list"));
    assert_eq!(check(m.clone(), json!(["gold", 1])), Err("Must be a list of strings"));
    assert_eq!(check(m.clone(), json!(["gold", "tin"])), Err("Invalid value"));
    assert_eq!(check(m, json!(["gold", "silver"])), Ok(()));
  }

  #[test]
  fn dates() {
    let d = NewAttrDef::new("installedOn", "Installed", FieldType::Date);
    assert_eq!(check(d.clone(), json!("2024-02-29")), Ok(()));
    assert_eq!(check(d.clone(), json!("2024-03-01T10:15:00Z")), Ok(()));
    assert_eq!(check(d.clone(), json!("2024-03-01T10:15:00")), Ok(()));
    assert_eq!(check(d.clone(), json!("2023-02-29")), Err("Invalid date"));
    assert_eq!(check(d.clone(), json!("yesterday")), Err("Invalid date"));
    assert_eq!(check(d, json!(20240101)), Err("Must be a date string"));
  }

  #[test]
  fn ipv4_is_strict() {
    let d = NewAttrDef::new("mgmtIp", "IP", FieldType::Ip);
    assert_eq!(check(d.clone(), json!("10.0.0.1")), Ok(()));
    assert_eq!(check(d.clone(), json!("255.255.255.255")), Ok(()));
    for bad in ["10.0.0", "10.0.0.256", "10.0.0.1 ", "a.b.c.d", "10..0.1", "1.2.3.4.5"] {
      assert_eq!(check(d.clone(), json!(bad)), Err("Invalid IP"), "{bad}");
    }
  }

  #[test]
  fn mac_addresses() {
    let d = NewAttrDef::new("mac", "MAC", FieldType::Mac);
    assert_eq!(check(d.clone(), json!("00:1A:2b:3C:4d:5E")), Ok(()));
    assert_eq!(check(d.clone(), json!("00-1A-2B-3C-4D-5E")), Ok(()));
    assert_eq!(check(d.clone(), json!("001A2B3C4D5E")), Err("Invalid MAC"));
    assert_eq!(check(d, json!("00:1A:2B:3C:4D:5G")), Err("Invalid MAC"));
  }

  #[test]
  fn hostnames() {
    let d = NewAttrDef::new("fqdn", "FQDN", FieldType::Hostname);
    assert_eq!(check(d.clone(), json!("db-01.prod.example.com")), Ok(()));
    assert_eq!(check(d.clone(), json!("-db.example.com")), Err("Invalid hostname"));
    assert_eq!(check(d.clone(), json!("db-.example.com")), Err("Invalid hostname"));
    assert_eq!(check(d.clone(), json!("db..example.com")), Err("Invalid hostname"));
    assert_eq!(check(d.clone(), json!("a".repeat(64))), Err("Invalid hostname"));
    let long = vec!["a".repeat(60); 5].join(".");
    assert_eq!(check(d, json!(long)), Err("Invalid hostname"));
  }

  #[test]
  fn cidr_blocks() {
    let d = NewAttrDef::new("subnet", "Subnet", FieldType::Cidr);
    assert_eq!(check(d.clone(), json!("10.0.0.0/8")), Ok(()));
    assert_eq!(check(d.clone(), json!("0.0.0.0/0")), Ok(()));
    for bad in ["10.0.0.0", "10.0.0.0/33", "10.0.0.0/", "10.0.0/8", "10.0.0.0/8/1"] {
      assert_eq!(check(d.clone(), json!(bad)), Err("Invalid CIDR"), "{bad}");
    }
  }

  #[test]
  fn ports_default_and_override_bounds() {
    let d = NewAttrDef::new("port", "Port", FieldType::Port);
    assert_eq!(check(d.clone(), json!(443)), Ok(()));
    assert_eq!(check(d.clone(), json!(0)), Err("Invalid port"));
    assert_eq!(check(d.clone(), json!(65536)), Err("Invalid port"));
    assert_eq!(check(d.clone(), json!(80.5)), Err("Must be an integer"));
    assert_eq!(check(d.clone(), json!("80")), Err("Must be a number"));

    let mut custom = d;
    custom.min_value = Some(8000.0);
    custom.max_value = Some(9000.0);
    assert_eq!(check(custom.clone(), json!(443)), Err("Invalid port"));
    assert_eq!(check(custom, json!(8080)), Ok(()));
  }

  #[test]
  fn regex_uses_definition_pattern() {
    let mut d = NewAttrDef::new("serial", "Serial", FieldType::Regex);
    assert_eq!(check(d.clone(), json!("SN-1")), Err("Pattern is required"));
    d.pattern = Some("(".into());
    assert_eq!(check(d.clone(), json!("SN-1")), Err("Invalid pattern"));
    d.pattern = Some("^SN-[0-9]+$".into());
    assert_eq!(check(d.clone(), json!("XX-1")), Err("Value does not match pattern"));
    assert_eq!(check(d, json!("SN-42")), Ok(()));
  }

  #[test]
  fn json_must_be_object() {
    let d = NewAttrDef::new("extra", "Extra", FieldType::Json);
    assert_eq!(check(d.clone(), json!({ "a": 1 })), Ok(()));
    assert_eq!(check(d.clone(), json!([1, 2])), Err("Must be a JSON object"));
    assert_eq!(check(d, json!("{}")), Err("Must be a JSON object"));
  }

  // ── Aggregation ──────────────────────────────────────────────────────────

  #[test]
  fn aggregates_every_offending_field() {
    let mut ram = NewAttrDef::new("ramGb", "RAM", FieldType::Number);
    ram.max_value = Some(512.0);
    let defs = vec![
      def(NewAttrDef::new("owner", "Owner", FieldType::String).required()),
      def(NewAttrDef::new("site", "Site", FieldType::String).required()),
      def(ram),
    ];

    let err = validate_attributes(&defs, &payload(json!({ "ramGb": 1024 })))
      .unwrap_err();
    let errors = err.field_errors();
    assert_eq!(errors.len(), 3);
    assert!(errors.contains(&FieldError::new("owner", "Required field")));
    assert!(errors.contains(&FieldError::new("site", "Required field")));
    assert!(errors.contains(&FieldError::new("ramGb", "Value above maximum")));
  }

  #[test]
  fn empty_string_and_null_count_as_missing() {
    let defs = vec![
      def(NewAttrDef::new("owner", "Owner", FieldType::String).required()),
      def(NewAttrDef::new("notes", "Notes", FieldType::Number)),
    ];
    let err = validate_attributes(&defs, &payload(json!({ "owner": "", "notes": null })))
      .unwrap_err();
    assert_eq!(err.field_errors(), &[FieldError::new("owner", "Required field")]);
  }

  #[test]
  fn empty_payload_against_empty_schema_is_valid() {
    assert!(validate_attributes(&[], &Map::new()).is_ok());
    assert!(validate_attributes(&[], &payload(json!({ "anything": 1 }))).is_ok());
  }
}
