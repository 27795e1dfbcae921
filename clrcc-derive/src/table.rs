use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Field, Type};

/// Field types whose `FromByteStream::Deps` is `IndexSizes` rather than `()`:
/// heap indices, coded indices and same-table row indices. Everything else
/// (bitflags, plain integers, enums read via `impl_from_byte_stream!`) takes `()`.
const SIZED_TYPES: &[&str] = &[
	"StringIndex", "BlobIndex", "GuidIndex",
	"TypeDefOrRef", "HasConstant", "HasCustomAttribute", "HasFieldMarshal",
	"HasDeclSecurity", "MemberRefParent", "HasSemantics", "MethodDefOrRef",
	"MemberForwarded", "Implementation", "CustomAttributeType", "ResolutionScope",
	"TypeOrMethodDef", "HasCustomDebugInformation",
	"FieldIndex", "MethodDefIndex", "ParamIndex", "TypeDefIndex",
	"EventIndex", "PropertyIndex", "ModuleRefIndex", "GenericParamIndex",
];

pub fn derive(tokens: proc_macro::TokenStream) -> TokenStream {
	let DeriveInput { ident, data, .. } = syn::parse(tokens).unwrap();

	let data = match data {
		Data::Struct(data) => data,
		Data::Enum(_) => panic!("Enums are not supported"),
		Data::Union(_) => panic!("Unions are not supported"),
	};

	let table = format_ident!("{}Table", ident);
	let reads = data.fields.iter().map(|Field { ident: field, ty, .. }| match ty {
		Type::Path(path) if path.path.get_ident().is_some_and(|i| SIZED_TYPES.contains(&i.to_string().as_str())) => quote! {
			#field: <#ty as crate::utilities::FromByteStream>::read(stream, sizes)?
		},
		_ => quote! {
			#field: <#ty as crate::utilities::FromByteStream>::read(stream, &())?
		},
	});

	quote! {
		#[derive(Debug, Clone)]
		pub struct #table {
			rows: Vec<#ident>,
		}

		impl #table {
			pub fn read(stream: &mut std::io::Cursor<&[u8]>, sizes: &IndexSizes, len: usize) -> std::io::Result<Self> {
				let mut rows = Vec::with_capacity(len);
				for _ in 0..len {
					rows.push(#ident { #(#reads),* })
				}
				Ok(Self { rows })
			}

			pub fn rows(&self) -> &[#ident] {
				&self.rows
			}

			pub fn get(&self, index: usize) -> Option<&#ident> {
				self.rows.get(index)
			}
		}

		impl Table for #table {
			fn len(&self) -> usize {
				self.rows.len()
			}

			fn kind(&self) -> TableKind {
				TableKind::#ident
			}
		}
	}
}
