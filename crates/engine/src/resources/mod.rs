//! Queryable resources.
//!
//! Each module holds one descriptor table and the row type it materializes.

pub mod catalog;
pub mod category;
pub mod event_kind;
pub mod image;
pub mod product;
pub mod quote;
pub mod section;
pub mod wizard;

pub use catalog::CatalogProduct;
pub use category::Category;
pub use event_kind::EventKind;
pub use image::Image;
pub use product::Product;
pub use quote::Quote;
pub use crate::aggregate::Section;
pub use wizard::Wizard;

use crate::query::ResourceDescriptor;

/// Every listing descriptor, for tooling and validation.
pub fn descriptors() -> [&'static ResourceDescriptor; 8] {
    [
        &catalog::DESCRIPTOR,
        &product::DESCRIPTOR,
        &category::DESCRIPTOR,
        &section::DESCRIPTOR,
        &wizard::DESCRIPTOR,
        &quote::DESCRIPTOR,
        &image::DESCRIPTOR,
        &event_kind::DESCRIPTOR,
    ]
}

/// Look up a descriptor by resource name.
pub fn descriptor(name: &str) -> Option<&'static ResourceDescriptor> {
    descriptors().into_iter().find(|d| d.name == name)
}
