//! # Payload Converters
//!
//! Connectors usually deliver raw bytes while mediators declare the payload
//! type they consume. Before a handler is invoked the invoker asks the
//! [`ConverterRegistry`] to turn the inbound payload into the consumed type.
//!
//! Built-in converters cover [`Bytes`], `Vec<u8>` and [`String`] in every
//! direction. Applications register more with [`ConverterRegistry::register`].

use crate::error::InvocationError;
use crate::message::Payload;
use crate::types::TypeTag;
use bytes::Bytes;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

type ConvertFn = Arc<dyn Fn(&Payload) -> Result<Payload, InvocationError> + Send + Sync>;

/// Lookup table of payload converters keyed by source and target type.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
  converters: HashMap<(TypeId, TypeId), ConvertFn>,
}

impl ConverterRegistry {
  /// An empty registry.
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry holding the built-in byte and string converters.
  #[must_use]
  pub fn with_defaults() -> Self {
    let mut registry = Self::new();
    registry.register(|b: &Bytes| {
      String::from_utf8(b.to_vec()).map_err(InvocationError::from_error)
    });
    registry.register(|s: &String| Ok(Bytes::from(s.clone())));
    registry.register(|v: &Vec<u8>| String::from_utf8(v.clone()).map_err(InvocationError::from_error));
    registry.register(|s: &String| Ok(s.clone().into_bytes()));
    registry.register(|b: &Bytes| Ok(b.to_vec()));
    registry.register(|v: &Vec<u8>| Ok(Bytes::from(v.clone())));
    registry
  }

  /// Registers a conversion from `A` to `B`, replacing any previous one.
  pub fn register<A, B, F>(&mut self, convert: F) -> &mut Self
  where
    A: Any + Send + Sync,
    B: Any + Send + Sync,
    F: Fn(&A) -> Result<B, InvocationError> + Send + Sync + 'static,
  {
    let erased: ConvertFn = Arc::new(move |payload: &Payload| {
      let value = payload.downcast_ref::<A>().ok_or_else(|| {
        InvocationError::new(format!(
          "converter expected {}, got {}",
          std::any::type_name::<A>(),
          payload.tag()
        ))
      })?;
      convert(value).map(Payload::new)
    });
    self
      .converters
      .insert((TypeId::of::<A>(), TypeId::of::<B>()), erased);
    self
  }

  /// Returns true if a payload of `from` can become a `to`.
  #[must_use]
  pub fn can_convert(&self, from: TypeTag, to: TypeTag) -> bool {
    from == to || self.converters.contains_key(&(from.id(), to.id()))
  }

  /// Converts `payload` to `target`. A payload already of the target type is
  /// returned unchanged.
  pub fn convert(&self, payload: Payload, target: TypeTag) -> Result<Payload, InvocationError> {
    if payload.tag() == target {
      return Ok(payload);
    }
    let convert = self
      .converters
      .get(&(payload.tag().id(), target.id()))
      .ok_or_else(|| {
        InvocationError::new(format!(
          "no converter from {} to {}",
          payload.tag(),
          target
        ))
      })?;
    trace!(from = %payload.tag(), to = %target, "converting payload");
    convert(&payload)
  }

  /// Number of registered converters.
  #[must_use]
  pub fn len(&self) -> usize {
    self.converters.len()
  }

  /// Returns true if no converter is registered.
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.converters.is_empty()
  }
}

impl fmt::Debug for ConverterRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ConverterRegistry")
      .field("converters", &self.converters.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_same_type_is_identity() {
    let registry = ConverterRegistry::new();
    let payload = Payload::new(7i32);
    let converted = registry.convert(payload, TypeTag::of::<i32>()).unwrap();
    assert_eq!(converted.downcast_ref::<i32>(), Some(&7));
  }

  #[test]
  fn test_bytes_to_string() {
    let registry = ConverterRegistry::with_defaults();
    let payload = Payload::new(Bytes::from_static(b"hello"));
    let converted = registry.convert(payload, TypeTag::of::<String>()).unwrap();
    assert_eq!(converted.downcast_ref::<String>().map(String::as_str), Some("hello"));
  }

  #[test]
  fn test_invalid_utf8_fails() {
    let registry = ConverterRegistry::with_defaults();
    let payload = Payload::new(vec![0xffu8, 0xfe]);
    assert!(registry.convert(payload, TypeTag::of::<String>()).is_err());
  }

  #[test]
  fn test_missing_converter() {
    let registry = ConverterRegistry::with_defaults();
    let err = registry
      .convert(Payload::new(1u64), TypeTag::of::<String>())
      .unwrap_err();
    assert!(err.reason.contains("no converter"));
  }

  #[test]
  fn test_custom_converter() {
    let mut registry = ConverterRegistry::new();
    registry.register(|s: &String| {
      s.trim()
        .parse::<i32>()
        .map_err(InvocationError::from_error)
    });
    assert!(registry.can_convert(TypeTag::of::<String>(), TypeTag::of::<i32>()));
    let converted = registry
      .convert(Payload::new(String::from(" 42 ")), TypeTag::of::<i32>())
      .unwrap();
    assert_eq!(converted.downcast_ref::<i32>(), Some(&42));
  }
}
