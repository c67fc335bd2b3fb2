//! `#[repr(C)]` value layout shared with natively compiled block code.
//!
//! [`ValueData`] is a plain tagged union with no behaviour of its own. Every
//! operation on it is a free `extern "C"` function taking the struct by
//! address, so ahead-of-time compiled code and the interpreter agree on one
//! layout. The ergonomic [`Value`] type converts to and from it at the
//! boundary and is never itself passed across.
//!
//! String payloads are owned, NUL-terminated heap strings allocated by this
//! module. A `ValueData` holding a string must eventually be released with
//! [`value_free`] (or overwritten by one of the `value_assign_*` functions,
//! which release the previous payload first).

use crate::value::Value;
use std::ffi::{c_char, c_void, CStr, CString};

/// Type discriminant of a [`ValueData`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Number = 0,
    Bool = 1,
    String = 2,
    Pointer = 3,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union WirePayload {
    pub number: f64,
    pub boolean: bool,
    pub string: *mut c_char,
    pub pointer: *const c_void,
}

/// The wire struct. Not `Copy`: a string payload has exactly one owner, so
/// duplicates go through [`value_assign_copy`].
#[repr(C)]
pub struct ValueData {
    pub payload: WirePayload,
    pub ty: WireType,
}

impl Default for ValueData {
    fn default() -> Self {
        ValueData {
            payload: WirePayload { number: 0.0 },
            ty: WireType::Number,
        }
    }
}

impl std::fmt::Debug for ValueData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // SAFETY: the discriminant selects the initialised field.
        unsafe {
            match self.ty {
                WireType::Number => write!(f, "ValueData::Number({})", self.payload.number),
                WireType::Bool => write!(f, "ValueData::Bool({})", self.payload.boolean),
                WireType::String => write!(f, "ValueData::String({:?})", string_payload(self)),
                WireType::Pointer => write!(f, "ValueData::Pointer({:p})", self.payload.pointer),
            }
        }
    }
}

impl ValueData {
    /// Encode a [`Value`]. The special numbers travel as their float
    /// sentinels.
    pub fn from_value(value: &Value) -> ValueData {
        match value {
            Value::Bool(b) => ValueData {
                payload: WirePayload { boolean: *b },
                ty: WireType::Bool,
            },
            Value::String(s) => ValueData {
                payload: WirePayload {
                    string: owned_c_string(s).into_raw(),
                },
                ty: WireType::String,
            },
            other => ValueData {
                payload: WirePayload {
                    number: other.to_double_raw(),
                },
                ty: WireType::Number,
            },
        }
    }

    /// Decode into a [`Value`]. Pointer payloads have no value meaning and
    /// decode as `0`.
    pub fn to_value(&self) -> Value {
        // SAFETY: the discriminant selects the initialised field.
        unsafe {
            match self.ty {
                WireType::Number => Value::from(self.payload.number),
                WireType::Bool => Value::Bool(self.payload.boolean),
                WireType::String => Value::from(string_payload(self)),
                WireType::Pointer => Value::default(),
            }
        }
    }
}

impl Value {
    /// Like `to_double`, but keeps `NaN` as a float `NaN` instead of `0`.
    fn to_double_raw(&self) -> f64 {
        match self {
            Value::NaN => f64::NAN,
            other => other.to_double(),
        }
    }
}

fn owned_c_string(text: &str) -> CString {
    let bytes: Vec<u8> = text
        .bytes()
        .map(|b| if b == 0 { b'?' } else { b })
        .collect();
    // Interior NULs were replaced above.
    CString::new(bytes).unwrap_or_default()
}

/// # Safety
/// `data.ty` must be `String` and the payload a live string from this module.
unsafe fn string_payload(data: &ValueData) -> String {
    let ptr = data.payload.string;
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// # Safety
/// `data` must point to a valid `ValueData`.
unsafe fn release(data: &mut ValueData) {
    if data.ty == WireType::String && !data.payload.string.is_null() {
        drop(CString::from_raw(data.payload.string));
    }
    data.payload = WirePayload { number: 0.0 };
    data.ty = WireType::Number;
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Initialise `data` to the number `0`. Any previous payload is ignored, so
/// this is only for uninitialised memory.
///
/// # Safety
/// `data` must be null or point to writable memory for a `ValueData`.
#[no_mangle]
pub unsafe extern "C" fn value_init(data: *mut ValueData) {
    if data.is_null() {
        return;
    }
    data.write(ValueData::default());
}

/// Release an owned string payload and reset `data` to the number `0`.
///
/// # Safety
/// `data` must be null or point to an initialised `ValueData`.
#[no_mangle]
pub unsafe extern "C" fn value_free(data: *mut ValueData) {
    if let Some(data) = data.as_mut() {
        release(data);
    }
}

/// # Safety
/// `data` must be null or point to an initialised `ValueData`.
#[no_mangle]
pub unsafe extern "C" fn value_assign_double(data: *mut ValueData, number: f64) {
    if let Some(data) = data.as_mut() {
        release(data);
        data.payload = WirePayload { number };
    }
}

/// # Safety
/// `data` must be null or point to an initialised `ValueData`.
#[no_mangle]
pub unsafe extern "C" fn value_assign_bool(data: *mut ValueData, boolean: bool) {
    if let Some(data) = data.as_mut() {
        release(data);
        data.payload = WirePayload { boolean };
        data.ty = WireType::Bool;
    }
}

/// Copy a NUL-terminated string into `data`. A null `text` assigns `""`.
///
/// # Safety
/// `data` must be null or point to an initialised `ValueData`; `text` must be
/// null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn value_assign_cstr(data: *mut ValueData, text: *const c_char) {
    let Some(data) = data.as_mut() else {
        return;
    };
    let owned = if text.is_null() {
        CString::default()
    } else {
        CStr::from_ptr(text).to_owned()
    };
    release(data);
    data.payload = WirePayload {
        string: owned.into_raw(),
    };
    data.ty = WireType::String;
}

/// Deep-copy `src` into `dst`. Self-assignment is a no-op.
///
/// # Safety
/// Both pointers must be null or point to initialised `ValueData`s.
#[no_mangle]
pub unsafe extern "C" fn value_assign_copy(dst: *mut ValueData, src: *const ValueData) {
    if dst.is_null() || src.is_null() || std::ptr::eq(dst, src) {
        return;
    }
    let src = &*src;
    let payload = match src.ty {
        WireType::String => {
            let text = string_payload(src);
            WirePayload {
                string: owned_c_string(&text).into_raw(),
            }
        }
        _ => src.payload,
    };
    let dst = &mut *dst;
    release(dst);
    dst.payload = payload;
    dst.ty = src.ty;
}

/// # Safety
/// `data` must be null or point to an initialised `ValueData`.
#[no_mangle]
pub unsafe extern "C" fn value_to_double(data: *const ValueData) -> f64 {
    data.as_ref().map_or(0.0, |d| d.to_value().to_double())
}

/// # Safety
/// `data` must be null or point to an initialised `ValueData`.
#[no_mangle]
pub unsafe extern "C" fn value_to_bool(data: *const ValueData) -> bool {
    data.as_ref().is_some_and(|d| d.to_value().to_bool())
}

/// Render `data` as a newly allocated string; release it with
/// [`value_free_cstring`].
///
/// # Safety
/// `data` must be null or point to an initialised `ValueData`.
#[no_mangle]
pub unsafe extern "C" fn value_to_cstring(data: *const ValueData) -> *mut c_char {
    let text = data
        .as_ref()
        .map(|d| d.to_value().to_string())
        .unwrap_or_default();
    owned_c_string(&text).into_raw()
}

/// # Safety
/// `text` must be null or a pointer returned by [`value_to_cstring`] that
/// has not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn value_free_cstring(text: *mut c_char) {
    if !text.is_null() {
        drop(CString::from_raw(text));
    }
}

/// Language equality of two wire values.
///
/// # Safety
/// Both pointers must be null or point to initialised `ValueData`s.
#[no_mangle]
pub unsafe extern "C" fn value_equals(a: *const ValueData, b: *const ValueData) -> bool {
    match (a.as_ref(), b.as_ref()) {
        (Some(a), Some(b)) => a.to_value().equals(&b.to_value()),
        _ => false,
    }
}
