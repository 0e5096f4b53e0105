//! Embedder data attached to heap objects, and its serialization into the
//! snapshot.
//!
//! Objects created by the context initializer can carry a fixed-size record
//! in each internal field slot. The record layout belongs to the embedding
//! layer (see [`crate::bindings::BindingRecord`]); this module only ever
//! copies the bytes.

use std::ffi::c_void;

use deno_core::v8;

/// Size in bytes of every internal field record.
pub const RECORD_SIZE: usize = 8;

/// Opaque embedder payload stored in one internal field slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalFieldRecord([u8; RECORD_SIZE]);

impl InternalFieldRecord {
    /// Wrap raw record bytes.
    pub const fn from_bytes(bytes: [u8; RECORD_SIZE]) -> Self {
        Self(bytes)
    }

    /// The record's bytes, uninterpreted.
    pub fn as_bytes(&self) -> &[u8; RECORD_SIZE] {
        &self.0
    }
}

/// Anything that exposes internal field records by slot index.
pub trait FieldHolder {
    fn internal_field(&self, index: usize) -> Option<&InternalFieldRecord>;

    fn field_count(&self) -> usize;
}

/// Serialized form of one internal field.
///
/// An empty field carries no allocation. A present one owns its bytes until
/// they are handed to the engine with [`SerializedField::into_boxed_slice`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SerializedField(Option<Box<[u8]>>);

impl SerializedField {
    /// A field with no payload.
    pub fn empty() -> Self {
        Self(None)
    }

    /// True if the slot had no record.
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Payload length; zero when empty.
    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |bytes| bytes.len())
    }

    /// Borrow the payload, if any.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    /// Give up ownership of the payload.
    pub fn into_boxed_slice(self) -> Option<Box<[u8]>> {
        self.0
    }
}

/// Signature shared by internal field serializers.
pub type SerializeInternalFieldsCallback =
    fn(holder: &dyn FieldHolder, index: usize, data: *mut c_void) -> SerializedField;

/// Copy the record at `index` out of `holder`, byte for byte.
///
/// `data` is the callback's scratch pointer and must be null.
pub fn serialize_internal_field(
    holder: &dyn FieldHolder,
    index: usize,
    data: *mut c_void,
) -> SerializedField {
    assert!(data.is_null(), "internal field serializer got non-null callback data");

    match holder.internal_field(index) {
        Some(record) => SerializedField(Some(Box::from(&record.as_bytes()[..]))),
        None => SerializedField::empty(),
    }
}

/// A heap object the context initializer attached records to.
pub struct EmbedderObject<'s> {
    object: v8::Local<'s, v8::Object>,
    slots: Vec<Option<InternalFieldRecord>>,
}

impl<'s> EmbedderObject<'s> {
    pub fn object(&self) -> v8::Local<'s, v8::Object> {
        self.object
    }
}

impl FieldHolder for EmbedderObject<'_> {
    fn internal_field(&self, index: usize) -> Option<&InternalFieldRecord> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    fn field_count(&self) -> usize {
        self.slots.len()
    }
}

/// Every object with embedder records in the context being snapshotted.
///
/// Holds only local handles, so it cannot outlive the handle scope that
/// builds the default context.
#[derive(Default)]
pub struct EmbedderFields<'s> {
    objects: Vec<EmbedderObject<'s>>,
}

impl<'s> EmbedderFields<'s> {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    pub fn attach(
        &mut self,
        object: v8::Local<'s, v8::Object>,
        slots: Vec<Option<InternalFieldRecord>>,
    ) {
        self.objects.push(EmbedderObject { object, slots });
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmbedderObject<'s>> {
        self.objects.iter()
    }
}
