use std::fs::File;
use std::io::BufWriter;
use std::time::SystemTime;

use memory_stats::memory_stats;
use tracing_flame::FlameLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use clrcc::ir::Module;
use clrcc::{BuildOptions, CppEmitter, DeclaredField, DeclaredMethod, DeclaredType, IcallRegistry, IRBuilder, MethodBody, Origin};

fn setup_global_subscriber() -> impl Drop {
	let file = File::create("./trace.folded").unwrap();
	let flame_layer = FlameLayer::new(BufWriter::new(file)).with_file_and_line(false);
	let guard = flame_layer.flush_on_drop();

	let subscriber = Registry::default()
		.with(flame_layer);

	tracing::subscriber::set_global_default(subscriber).expect("Could not set global default");
	guard
}

/// A tiny synthetic assembly standing in for a real one: this crate has no
/// front door that reads PE/metadata into `DeclaredType`s yet (see
/// DESIGN.md), so the demo builds the descriptors by hand instead.
fn sample_assembly() -> Vec<DeclaredType> {
	// static int Add(int a, int b) => a + b; as: ldarg.0; ldarg.1; add; ret
	let add_body = vec![0x02, 0x03, 0x58, 0x2A];

	vec![DeclaredType {
		full_name: "App.Program".into(),
		short_name: "Program".into(),
		namespace: "App".into(),
		origin: Origin::User,
		is_value_type: false,
		is_interface: false,
		is_abstract: false,
		is_sealed: false,
		is_enum: false,
		is_delegate: false,
		is_record: false,
		is_runtime_provided: false,
		is_open_generic: false,
		generic_argument_names: Vec::new(),
		base_type_full_name: Some("System.Object".into()),
		interface_full_names: Vec::new(),
		fields: vec![DeclaredField {
			name: "Count".into(),
			type_full_name: "System.Int32".into(),
			is_static: false,
			visibility: clrcc::ir::Visibility::Public,
			size: 4,
		}],
		methods: vec![
			DeclaredMethod {
				name: "Add".into(),
				return_type_full_name: "System.Int32".into(),
				parameters: vec![("a".into(), "System.Int32".into()), ("b".into(), "System.Int32".into())],
				is_static: true,
				is_virtual: false,
				is_abstract: false,
				is_constructor: false,
				is_class_constructor: false,
				is_finalizer: false,
				is_entry_point_candidate: false,
				is_internal_call: false,
				is_open_generic: false,
				body: Some(MethodBody { bytecode: add_body, exception_regions: Vec::new() }),
			},
			DeclaredMethod {
				name: "Main".into(),
				return_type_full_name: "System.Void".into(),
				parameters: Vec::new(),
				is_static: true,
				is_virtual: false,
				is_abstract: false,
				is_constructor: false,
				is_class_constructor: false,
				is_finalizer: false,
				is_entry_point_candidate: true,
				is_internal_call: false,
				is_open_generic: false,
				body: Some(MethodBody { bytecode: vec![0x2A], exception_regions: Vec::new() }),
			},
		],
	}]
}

fn main() {
	let _guard = setup_global_subscriber();

	let mut start = SystemTime::now();
	let declared_types = sample_assembly();
	let options = BuildOptions::default();
	let icalls = IcallRegistry::new();
	let mut builder = IRBuilder::new(options, icalls, &declared_types, true);

	println! {
		"Setup time: {:?}, RAM: {}MB",
		start.elapsed().unwrap(),
		memory_stats().unwrap().virtual_mem as f32 / 1000000.0,
	}

	start = SystemTime::now();
	let module = Module::new();
	let result = builder.build(&module);

	println! {
		"Build time: {:?}, RAM: {}MB",
		start.elapsed().unwrap(),
		memory_stats().unwrap().virtual_mem as f32 / 1000000.0,
	}

	println!("Entry point: {:?}", result.entry_point);

	let emitter = CppEmitter::new(result.module);
	let units = emitter.emit(result.entry_point.as_deref());
	println!("Translation units emitted: {}", units.len());
	for unit in &units {
		println!("--- {} ---\n{}", unit.file_name, unit.source);
	}
}
