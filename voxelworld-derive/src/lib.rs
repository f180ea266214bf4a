use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Fields, LitStr};

/// This derives the `Entity` trait for persisted document structs.
///
/// The entity type tag is the struct name. The collection is taken from
/// `#[entity(collection = "...")]` and the struct must have a named `id: String` field.
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let mut collection: Option<LitStr> = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                collection = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported entity attribute"))
            }
        });
        if let Err(err) = parsed {
            return TokenStream::from(err.to_compile_error());
        }
    }

    let Some(collection) = collection else {
        return TokenStream::from(
            syn::Error::new(
                input.ident.span(),
                "`Entity` needs `#[entity(collection = \"...\")]`",
            )
            .to_compile_error(),
        );
    };

    if let syn::Data::Struct(ref data) = input.data {
        if let Fields::Named(ref fields) = data.fields {
            let has_id = fields
                .named
                .iter()
                .any(|field| field.ident.as_ref().is_some_and(|ident| ident == "id"));
            if has_id {
                let name = &input.ident;
                let type_tag = name.to_string();
                return TokenStream::from(quote!(
                    impl crate::storage::entity::Entity for #name {
                        const ENTITY_TYPE: &'static str = #type_tag;
                        const COLLECTION: &'static str = #collection;

                        fn id(&self) -> &str {
                            &self.id
                        }
                    }
                ));
            }
        }
    }

    TokenStream::from(
        syn::Error::new(
            input.ident.span(),
            "Only structs with a named `id` field can derive `Entity`",
        )
        .to_compile_error(),
    )
}
