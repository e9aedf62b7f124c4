// This file is part of Meridian.

// Copyright (C) Meridian Developers.
// SPDX-License-Identifier: GPL-3.0-or-later WITH Classpath-exception-2.0

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The WASM side of the runtime host: module compilation, instantiation,
//! host import marshalling and the call protocol.
//!
//! Host functions exchange byte buffers through 64-bit pointer-size values,
//! `(ptr << 32) | len`, in the guest's linear memory. Return buffers are
//! allocated through the freeing-bump allocator, which is reset at the
//! start of every runtime call. Instances are pooled and checked out
//! exclusively for one call at a time.

use crate::{
	allocator::FreeingBumpHeapAllocator,
	error::Error,
	host::{HostContext, LOG_TARGET},
};
use codec::{Decode, Encode};
use mp_core::crypto::KeyTypeId;
use parking_lot::Mutex;
use wasmtime::{Caller, Engine, Instance, Linker, Module, Store};

/// WASM page size in bytes.
const PAGE_SIZE: u64 = 65536;

/// Per-store state shared with host import closures.
pub struct StoreState {
	host: Option<HostContext>,
	allocator: FreeingBumpHeapAllocator,
	memory: Option<wasmtime::Memory>,
}

/// A compiled runtime blob plus a pool of instantiated copies.
pub struct WasmRuntime {
	engine: Engine,
	module: Module,
	pool: Mutex<Vec<InstanceHandle>>,
}

struct InstanceHandle {
	store: Store<StoreState>,
	instance: Instance,
	memory: wasmtime::Memory,
	heap_base: u32,
}

impl WasmRuntime {
	/// Compile `code` and register the host function set.
	pub fn new(code: &[u8]) -> Result<Self, Error> {
		let engine = Engine::default();
		let module =
			Module::new(&engine, code).map_err(|error| Error::Instantiation(error.to_string()))?;
		Ok(Self { engine, module, pool: Mutex::new(Vec::new()) })
	}

	/// Run one exported runtime function against `context`, returning the
	/// SCALE return buffer and handing the (possibly mutated) context back.
	pub fn call(
		&self,
		context: HostContext,
		method: &str,
		args: &[u8],
	) -> (Result<Vec<u8>, Error>, HostContext) {
		let mut handle = match self.acquire() {
			Ok(handle) => handle,
			Err(error) => return (Err(error), context),
		};
		handle.store.data_mut().host = Some(context);
		handle.store.data_mut().allocator = FreeingBumpHeapAllocator::new(handle.heap_base);

		let result = Self::dispatch(&mut handle, method, args);

		let context = handle
			.store
			.data_mut()
			.host
			.take()
			.expect("the context is installed above and only taken here; qed");
		// A trapped instance may hold arbitrary heap state; only healthy
		// instances go back into the pool.
		if result.is_ok() {
			self.pool.lock().push(handle);
		}
		(result, context)
	}

	fn dispatch(handle: &mut InstanceHandle, method: &str, args: &[u8]) -> Result<Vec<u8>, Error> {
		let func = handle
			.instance
			.get_typed_func::<(u32, u32), u64>(&mut handle.store, method)
			.map_err(|_| Error::MissingExport(method.to_string()))?;

		let input_ptr = {
			let memory = handle.memory;
			let attempt = {
				let (data, state) = memory.data_and_store_mut(&mut handle.store);
				state.allocator.allocate(&mut (&mut *data), args.len() as u32)
			};
			let ptr = match attempt {
				Ok(ptr) => ptr,
				Err(Error::OutOfMemory) => {
					let pages = (args.len() as u64 + PAGE_SIZE).div_ceil(PAGE_SIZE);
					memory
						.grow(&mut handle.store, pages)
						.map_err(|_| Error::Memory("linear memory refused to grow"))?;
					let (data, state) = memory.data_and_store_mut(&mut handle.store);
					state.allocator.allocate(&mut (&mut *data), args.len() as u32)?
				},
				Err(error) => return Err(error),
			};
			let (data, _) = memory.data_and_store_mut(&mut handle.store);
			data[ptr as usize..ptr as usize + args.len()].copy_from_slice(args);
			ptr
		};

		log::trace!(target: LOG_TARGET, "calling runtime export `{method}` with {} bytes", args.len());
		let packed = func
			.call(&mut handle.store, (input_ptr, args.len() as u32))
			.map_err(|error| Error::Trap(error.to_string()))?;

		let (ptr, len) = split_ptr_len(packed);
		let mut out = vec![0u8; len as usize];
		handle
			.memory
			.read(&handle.store, ptr as usize, &mut out)
			.map_err(|_| Error::Memory("runtime returned an out-of-bounds buffer"))?;
		Ok(out)
	}

	fn acquire(&self) -> Result<InstanceHandle, Error> {
		if let Some(handle) = self.pool.lock().pop() {
			return Ok(handle)
		}
		self.instantiate()
	}

	fn instantiate(&self) -> Result<InstanceHandle, Error> {
		let state = StoreState {
			host: None,
			allocator: FreeingBumpHeapAllocator::new(0),
			memory: None,
		};
		let mut store = Store::new(&self.engine, state);
		let mut linker: Linker<StoreState> = Linker::new(&self.engine);
		register_host_functions(&mut linker)?;

		// Older runtimes import their linear memory instead of exporting it.
		let mut imported_memory = None;
		for import in self.module.imports() {
			if let wasmtime::ExternType::Memory(memory_type) = import.ty() {
				let memory = wasmtime::Memory::new(&mut store, memory_type)
					.map_err(|error| Error::Instantiation(error.to_string()))?;
				linker
					.define(&store, import.module(), import.name(), memory)
					.map_err(|error| Error::Instantiation(error.to_string()))?;
				imported_memory = Some(memory);
			}
		}

		let instance = linker
			.instantiate(&mut store, &self.module)
			.map_err(|error| Error::Instantiation(error.to_string()))?;
		let memory = instance
			.get_memory(&mut store, "memory")
			.or(imported_memory)
			.ok_or_else(|| Error::Instantiation("runtime has no linear memory".into()))?;
		let heap_base = instance
			.get_global(&mut store, "__heap_base")
			.and_then(|global| global.get(&mut store).i32())
			.ok_or_else(|| Error::Instantiation("runtime does not export `__heap_base`".into()))?
			as u32;
		store.data_mut().memory = Some(memory);

		Ok(InstanceHandle { store, instance, memory, heap_base })
	}
}

fn split_ptr_len(packed: u64) -> (u32, u32) {
	((packed >> 32) as u32, packed as u32)
}

fn join_ptr_len(ptr: u32, len: u32) -> u64 {
	(u64::from(ptr) << 32) | u64::from(len)
}

// ---- host import marshalling ----

type HostCaller<'a> = Caller<'a, StoreState>;

fn memory_of(caller: &HostCaller) -> anyhow::Result<wasmtime::Memory> {
	caller
		.data()
		.memory
		.ok_or_else(|| anyhow::anyhow!("host function called before memory was attached"))
}

fn read_packed(caller: &mut HostCaller, packed: u64) -> anyhow::Result<Vec<u8>> {
	let (ptr, len) = split_ptr_len(packed);
	read_fixed(caller, ptr, len)
}

fn read_fixed(caller: &mut HostCaller, ptr: u32, len: u32) -> anyhow::Result<Vec<u8>> {
	let memory = memory_of(caller)?;
	let mut out = vec![0u8; len as usize];
	memory
		.read(&mut *caller, ptr as usize, &mut out)
		.map_err(|_| anyhow::anyhow!("host read outside the linear memory"))?;
	Ok(out)
}

fn guest_alloc(caller: &mut HostCaller, size: u32) -> anyhow::Result<u32> {
	let memory = memory_of(caller)?;
	let attempt = {
		let (data, state) = memory.data_and_store_mut(&mut *caller);
		state.allocator.allocate(&mut (&mut *data), size)
	};
	match attempt {
		Ok(ptr) => Ok(ptr),
		Err(Error::OutOfMemory) => {
			let pages = (u64::from(size) + PAGE_SIZE).div_ceil(PAGE_SIZE);
			memory
				.grow(&mut *caller, pages)
				.map_err(|_| anyhow::anyhow!("linear memory refused to grow"))?;
			let (data, state) = memory.data_and_store_mut(&mut *caller);
			Ok(state.allocator.allocate(&mut (&mut *data), size)?)
		},
		Err(error) => Err(error.into()),
	}
}

fn write_bytes(caller: &mut HostCaller, data: &[u8]) -> anyhow::Result<u64> {
	let ptr = guest_alloc(caller, data.len() as u32)?;
	let memory = memory_of(caller)?;
	memory
		.write(&mut *caller, ptr as usize, data)
		.map_err(|_| anyhow::anyhow!("host write outside the linear memory"))?;
	Ok(join_ptr_len(ptr, data.len() as u32))
}

/// Write a fixed-width buffer (hash or key) and return just its pointer.
fn write_fixed(caller: &mut HostCaller, data: &[u8]) -> anyhow::Result<u32> {
	let ptr = guest_alloc(caller, data.len() as u32)?;
	let memory = memory_of(caller)?;
	memory
		.write(&mut *caller, ptr as usize, data)
		.map_err(|_| anyhow::anyhow!("host write outside the linear memory"))?;
	Ok(ptr)
}

fn host<'a>(caller: &'a mut HostCaller<'_>) -> anyhow::Result<&'a mut HostContext> {
	caller
		.data_mut()
		.host
		.as_mut()
		.ok_or_else(|| anyhow::anyhow!("host function called outside a runtime call"))
}

fn key_type(raw: u32) -> KeyTypeId {
	KeyTypeId(raw.to_le_bytes())
}

fn to_array<const N: usize>(data: Vec<u8>) -> anyhow::Result<[u8; N]> {
	data.try_into()
		.map_err(|_| anyhow::anyhow!("fixed-width host argument has the wrong length"))
}

/// Register the full `ext_*` import surface on `linker`.
pub fn register_host_functions(linker: &mut Linker<StoreState>) -> Result<(), Error> {
	let env = "env";
	fn define<T>(name: &str, result: anyhow::Result<T>) -> Result<(), Error> {
		result
			.map(|_| ())
			.map_err(|error| Error::Instantiation(format!("defining `{name}`: {error}")))
	}

	// ---- storage ----
	define(
		"ext_storage_set_version_1",
		linker.func_wrap(env, "ext_storage_set_version_1", |mut caller: HostCaller, key: u64, value: u64| {
			let key = read_packed(&mut caller, key)?;
			let value = read_packed(&mut caller, value)?;
			host(&mut caller)?.storage_set(&key, &value);
			Ok(())
		}),
	)?;
	define(
		"ext_storage_get_version_1",
		linker.func_wrap(env, "ext_storage_get_version_1", |mut caller: HostCaller, key: u64| {
			let key = read_packed(&mut caller, key)?;
			let value = host(&mut caller)?.storage_get(&key);
			write_bytes(&mut caller, &value.encode())
		}),
	)?;
	define(
		"ext_storage_read_version_1",
		linker.func_wrap(
			env,
			"ext_storage_read_version_1",
			|mut caller: HostCaller, key: u64, out: u64, offset: u32| {
				let key = read_packed(&mut caller, key)?;
				let (out_ptr, out_len) = split_ptr_len(out);
				let chunk = host(&mut caller)?.storage_read(&key, offset, out_len)?;
				let written = match chunk {
					None => None,
					Some(chunk) => {
						let memory = memory_of(&caller)?;
						memory
							.write(&mut caller, out_ptr as usize, &chunk)
							.map_err(|_| anyhow::anyhow!("read buffer out of bounds"))?;
						Some(chunk.len() as u32)
					},
				};
				write_bytes(&mut caller, &written.encode())
			},
		),
	)?;
	define(
		"ext_storage_clear_version_1",
		linker.func_wrap(env, "ext_storage_clear_version_1", |mut caller: HostCaller, key: u64| {
			let key = read_packed(&mut caller, key)?;
			host(&mut caller)?.storage_clear(&key);
			Ok(())
		}),
	)?;
	define(
		"ext_storage_exists_version_1",
		linker.func_wrap(env, "ext_storage_exists_version_1", |mut caller: HostCaller, key: u64| {
			let key = read_packed(&mut caller, key)?;
			Ok(host(&mut caller)?.storage_exists(&key) as u32)
		}),
	)?;
	define(
		"ext_storage_clear_prefix_version_1",
		linker.func_wrap(
			env,
			"ext_storage_clear_prefix_version_1",
			|mut caller: HostCaller, prefix: u64| {
				let prefix = read_packed(&mut caller, prefix)?;
				host(&mut caller)?.storage_clear_prefix(&prefix);
				Ok(())
			},
		),
	)?;
	define(
		"ext_storage_append_version_1",
		linker.func_wrap(
			env,
			"ext_storage_append_version_1",
			|mut caller: HostCaller, key: u64, value: u64| {
				let key = read_packed(&mut caller, key)?;
				let value = read_packed(&mut caller, value)?;
				host(&mut caller)?.storage_append(&key, value);
				Ok(())
			},
		),
	)?;
	define(
		"ext_storage_root_version_1",
		linker.func_wrap(env, "ext_storage_root_version_1", |mut caller: HostCaller| {
			let root = host(&mut caller)?.storage_root();
			write_bytes(&mut caller, &root.as_bytes().to_vec().encode())
		}),
	)?;
	define(
		"ext_storage_next_key_version_1",
		linker.func_wrap(env, "ext_storage_next_key_version_1", |mut caller: HostCaller, key: u64| {
			let key = read_packed(&mut caller, key)?;
			let next = host(&mut caller)?.storage_next_key(&key);
			write_bytes(&mut caller, &next.encode())
		}),
	)?;
	define(
		"ext_storage_start_transaction_version_1",
		linker.func_wrap(env, "ext_storage_start_transaction_version_1", |mut caller: HostCaller| {
			host(&mut caller)?.storage_start_transaction();
			Ok(())
		}),
	)?;
	define(
		"ext_storage_commit_transaction_version_1",
		linker.func_wrap(env, "ext_storage_commit_transaction_version_1", |mut caller: HostCaller| {
			host(&mut caller)?.storage_commit_transaction()?;
			Ok(())
		}),
	)?;
	define(
		"ext_storage_rollback_transaction_version_1",
		linker.func_wrap(
			env,
			"ext_storage_rollback_transaction_version_1",
			|mut caller: HostCaller| {
				host(&mut caller)?.storage_rollback_transaction()?;
				Ok(())
			},
		),
	)?;

	// ---- default child storage ----
	define(
		"ext_default_child_storage_set_version_1",
		linker.func_wrap(
			env,
			"ext_default_child_storage_set_version_1",
			|mut caller: HostCaller, name: u64, key: u64, value: u64| {
				let name = read_packed(&mut caller, name)?;
				let key = read_packed(&mut caller, key)?;
				let value = read_packed(&mut caller, value)?;
				host(&mut caller)?.child_storage_set(&name, &key, &value);
				Ok(())
			},
		),
	)?;
	define(
		"ext_default_child_storage_get_version_1",
		linker.func_wrap(
			env,
			"ext_default_child_storage_get_version_1",
			|mut caller: HostCaller, name: u64, key: u64| {
				let name = read_packed(&mut caller, name)?;
				let key = read_packed(&mut caller, key)?;
				let value = host(&mut caller)?.child_storage_get(&name, &key);
				write_bytes(&mut caller, &value.encode())
			},
		),
	)?;
	define(
		"ext_default_child_storage_read_version_1",
		linker.func_wrap(
			env,
			"ext_default_child_storage_read_version_1",
			|mut caller: HostCaller, name: u64, key: u64, out: u64, offset: u32| {
				let name = read_packed(&mut caller, name)?;
				let key = read_packed(&mut caller, key)?;
				let (out_ptr, out_len) = split_ptr_len(out);
				let chunk = host(&mut caller)?.child_storage_read(&name, &key, offset, out_len)?;
				let written = match chunk {
					None => None,
					Some(chunk) => {
						let memory = memory_of(&caller)?;
						memory
							.write(&mut caller, out_ptr as usize, &chunk)
							.map_err(|_| anyhow::anyhow!("read buffer out of bounds"))?;
						Some(chunk.len() as u32)
					},
				};
				write_bytes(&mut caller, &written.encode())
			},
		),
	)?;
	define(
		"ext_default_child_storage_clear_version_1",
		linker.func_wrap(
			env,
			"ext_default_child_storage_clear_version_1",
			|mut caller: HostCaller, name: u64, key: u64| {
				let name = read_packed(&mut caller, name)?;
				let key = read_packed(&mut caller, key)?;
				host(&mut caller)?.child_storage_clear(&name, &key);
				Ok(())
			},
		),
	)?;
	define(
		"ext_default_child_storage_exists_version_1",
		linker.func_wrap(
			env,
			"ext_default_child_storage_exists_version_1",
			|mut caller: HostCaller, name: u64, key: u64| {
				let name = read_packed(&mut caller, name)?;
				let key = read_packed(&mut caller, key)?;
				Ok(host(&mut caller)?.child_storage_exists(&name, &key) as u32)
			},
		),
	)?;
	define(
		"ext_default_child_storage_clear_prefix_version_1",
		linker.func_wrap(
			env,
			"ext_default_child_storage_clear_prefix_version_1",
			|mut caller: HostCaller, name: u64, prefix: u64| {
				let name = read_packed(&mut caller, name)?;
				let prefix = read_packed(&mut caller, prefix)?;
				host(&mut caller)?.child_storage_clear_prefix(&name, &prefix);
				Ok(())
			},
		),
	)?;
	define(
		"ext_default_child_storage_root_version_1",
		linker.func_wrap(
			env,
			"ext_default_child_storage_root_version_1",
			|mut caller: HostCaller, name: u64| {
				let name = read_packed(&mut caller, name)?;
				let root = host(&mut caller)?
					.child_storage_root(&name)
					.unwrap_or_else(mp_trie::empty_trie_root);
				write_bytes(&mut caller, &root.as_bytes().to_vec().encode())
			},
		),
	)?;
	define(
		"ext_default_child_storage_next_key_version_1",
		linker.func_wrap(
			env,
			"ext_default_child_storage_next_key_version_1",
			|mut caller: HostCaller, name: u64, key: u64| {
				let name = read_packed(&mut caller, name)?;
				let key = read_packed(&mut caller, key)?;
				let next = host(&mut caller)?.child_storage_next_key(&name, &key);
				write_bytes(&mut caller, &next.encode())
			},
		),
	)?;
	define(
		"ext_default_child_storage_storage_kill_version_1",
		linker.func_wrap(
			env,
			"ext_default_child_storage_storage_kill_version_1",
			|mut caller: HostCaller, name: u64| {
				let name = read_packed(&mut caller, name)?;
				host(&mut caller)?.child_storage_kill(&name);
				Ok(())
			},
		),
	)?;

	// ---- crypto ----
	define(
		"ext_crypto_ed25519_generate_version_1",
		linker.func_wrap(
			env,
			"ext_crypto_ed25519_generate_version_1",
			|mut caller: HostCaller, id: u32, seed: u64| {
				let seed = read_packed(&mut caller, seed)?;
				let seed = Option::<Vec<u8>>::decode(&mut &seed[..])?;
				let public = host(&mut caller)?.ed25519_generate(key_type(id), seed);
				write_fixed(&mut caller, &public)
			},
		),
	)?;
	define(
		"ext_crypto_ed25519_public_keys_version_1",
		linker.func_wrap(
			env,
			"ext_crypto_ed25519_public_keys_version_1",
			|mut caller: HostCaller, id: u32| {
				let keys = host(&mut caller)?.ed25519_public_keys(key_type(id));
				write_bytes(&mut caller, &keys.encode())
			},
		),
	)?;
	define(
		"ext_crypto_ed25519_sign_version_1",
		linker.func_wrap(
			env,
			"ext_crypto_ed25519_sign_version_1",
			|mut caller: HostCaller, id: u32, public: u32, message: u64| {
				let public = to_array::<32>(read_fixed(&mut caller, public, 32)?)?;
				let message = read_packed(&mut caller, message)?;
				let signature = host(&mut caller)?.ed25519_sign(key_type(id), &public, &message);
				write_bytes(&mut caller, &signature.encode())
			},
		),
	)?;
	define(
		"ext_crypto_ed25519_verify_version_1",
		linker.func_wrap(
			env,
			"ext_crypto_ed25519_verify_version_1",
			|mut caller: HostCaller, signature: u32, message: u64, public: u32| {
				let signature = to_array::<64>(read_fixed(&mut caller, signature, 64)?)?;
				let message = read_packed(&mut caller, message)?;
				let public = to_array::<32>(read_fixed(&mut caller, public, 32)?)?;
				Ok(host(&mut caller)?.ed25519_verify(&signature, &message, &public) as u32)
			},
		),
	)?;
	define(
		"ext_crypto_sr25519_generate_version_1",
		linker.func_wrap(
			env,
			"ext_crypto_sr25519_generate_version_1",
			|mut caller: HostCaller, id: u32, seed: u64| {
				let seed = read_packed(&mut caller, seed)?;
				let seed = Option::<Vec<u8>>::decode(&mut &seed[..])?;
				let public = host(&mut caller)?.sr25519_generate(key_type(id), seed);
				write_fixed(&mut caller, &public)
			},
		),
	)?;
	define(
		"ext_crypto_sr25519_public_keys_version_1",
		linker.func_wrap(
			env,
			"ext_crypto_sr25519_public_keys_version_1",
			|mut caller: HostCaller, id: u32| {
				let keys = host(&mut caller)?.sr25519_public_keys(key_type(id));
				write_bytes(&mut caller, &keys.encode())
			},
		),
	)?;
	define(
		"ext_crypto_sr25519_sign_version_1",
		linker.func_wrap(
			env,
			"ext_crypto_sr25519_sign_version_1",
			|mut caller: HostCaller, id: u32, public: u32, message: u64| {
				let public = to_array::<32>(read_fixed(&mut caller, public, 32)?)?;
				let message = read_packed(&mut caller, message)?;
				let signature = host(&mut caller)?.sr25519_sign(key_type(id), &public, &message);
				write_bytes(&mut caller, &signature.encode())
			},
		),
	)?;
	define(
		"ext_crypto_sr25519_verify_version_1",
		linker.func_wrap(
			env,
			"ext_crypto_sr25519_verify_version_1",
			|mut caller: HostCaller, signature: u32, message: u64, public: u32| {
				let signature = to_array::<64>(read_fixed(&mut caller, signature, 64)?)?;
				let message = read_packed(&mut caller, message)?;
				let public = to_array::<32>(read_fixed(&mut caller, public, 32)?)?;
				Ok(host(&mut caller)?.sr25519_verify(&signature, &message, &public) as u32)
			},
		),
	)?;
	define(
		"ext_crypto_secp256k1_ecdsa_recover_version_1",
		linker.func_wrap(
			env,
			"ext_crypto_secp256k1_ecdsa_recover_version_1",
			|mut caller: HostCaller, signature: u32, message: u32| {
				let signature = to_array::<65>(read_fixed(&mut caller, signature, 65)?)?;
				let message = to_array::<32>(read_fixed(&mut caller, message, 32)?)?;
				let result = host(&mut caller)?.secp256k1_ecdsa_recover(&signature, &message);
				write_bytes(&mut caller, &result.encode())
			},
		),
	)?;
	define(
		"ext_crypto_secp256k1_ecdsa_recover_compressed_version_1",
		linker.func_wrap(
			env,
			"ext_crypto_secp256k1_ecdsa_recover_compressed_version_1",
			|mut caller: HostCaller, signature: u32, message: u32| {
				let signature = to_array::<65>(read_fixed(&mut caller, signature, 65)?)?;
				let message = to_array::<32>(read_fixed(&mut caller, message, 32)?)?;
				let result =
					host(&mut caller)?.secp256k1_ecdsa_recover_compressed(&signature, &message);
				write_bytes(&mut caller, &result.encode())
			},
		),
	)?;

	// ---- hashing ----
	define(
		"ext_hashing_blake2_128_version_1",
		linker.func_wrap(env, "ext_hashing_blake2_128_version_1", |mut caller: HostCaller, data: u64| {
			let data = read_packed(&mut caller, data)?;
			let hash = host(&mut caller)?.hashing_blake2_128(&data);
			write_fixed(&mut caller, &hash)
		}),
	)?;
	define(
		"ext_hashing_blake2_256_version_1",
		linker.func_wrap(env, "ext_hashing_blake2_256_version_1", |mut caller: HostCaller, data: u64| {
			let data = read_packed(&mut caller, data)?;
			let hash = host(&mut caller)?.hashing_blake2_256(&data);
			write_fixed(&mut caller, &hash)
		}),
	)?;
	define(
		"ext_hashing_keccak_256_version_1",
		linker.func_wrap(env, "ext_hashing_keccak_256_version_1", |mut caller: HostCaller, data: u64| {
			let data = read_packed(&mut caller, data)?;
			let hash = host(&mut caller)?.hashing_keccak_256(&data);
			write_fixed(&mut caller, &hash)
		}),
	)?;
	define(
		"ext_hashing_sha2_256_version_1",
		linker.func_wrap(env, "ext_hashing_sha2_256_version_1", |mut caller: HostCaller, data: u64| {
			let data = read_packed(&mut caller, data)?;
			let hash = host(&mut caller)?.hashing_sha2_256(&data);
			write_fixed(&mut caller, &hash)
		}),
	)?;
	define(
		"ext_hashing_twox_64_version_1",
		linker.func_wrap(env, "ext_hashing_twox_64_version_1", |mut caller: HostCaller, data: u64| {
			let data = read_packed(&mut caller, data)?;
			let hash = host(&mut caller)?.hashing_twox_64(&data);
			write_fixed(&mut caller, &hash)
		}),
	)?;
	define(
		"ext_hashing_twox_128_version_1",
		linker.func_wrap(env, "ext_hashing_twox_128_version_1", |mut caller: HostCaller, data: u64| {
			let data = read_packed(&mut caller, data)?;
			let hash = host(&mut caller)?.hashing_twox_128(&data);
			write_fixed(&mut caller, &hash)
		}),
	)?;
	define(
		"ext_hashing_twox_256_version_1",
		linker.func_wrap(env, "ext_hashing_twox_256_version_1", |mut caller: HostCaller, data: u64| {
			let data = read_packed(&mut caller, data)?;
			let hash = host(&mut caller)?.hashing_twox_256(&data);
			write_fixed(&mut caller, &hash)
		}),
	)?;

	// ---- trie ----
	define(
		"ext_trie_blake2_256_root_version_1",
		linker.func_wrap(env, "ext_trie_blake2_256_root_version_1", |mut caller: HostCaller, pairs: u64| {
			let pairs = read_packed(&mut caller, pairs)?;
			let pairs = Vec::<(Vec<u8>, Vec<u8>)>::decode(&mut &pairs[..])?;
			let root = host(&mut caller)?.trie_root(pairs);
			write_fixed(&mut caller, root.as_bytes())
		}),
	)?;
	define(
		"ext_trie_blake2_256_ordered_root_version_1",
		linker.func_wrap(
			env,
			"ext_trie_blake2_256_ordered_root_version_1",
			|mut caller: HostCaller, items: u64| {
				let items = read_packed(&mut caller, items)?;
				let items = Vec::<Vec<u8>>::decode(&mut &items[..])?;
				let root = host(&mut caller)?.trie_ordered_root(items);
				write_fixed(&mut caller, root.as_bytes())
			},
		),
	)?;

	// ---- offchain ----
	define(
		"ext_offchain_is_validator_version_1",
		linker.func_wrap(env, "ext_offchain_is_validator_version_1", |mut caller: HostCaller| {
			Ok(host(&mut caller)?.offchain_is_validator() as u32)
		}),
	)?;
	define(
		"ext_offchain_random_seed_version_1",
		linker.func_wrap(env, "ext_offchain_random_seed_version_1", |mut caller: HostCaller| {
			let seed = host(&mut caller)?.offchain_random_seed();
			write_fixed(&mut caller, &seed)
		}),
	)?;
	define(
		"ext_offchain_timestamp_version_1",
		linker.func_wrap(env, "ext_offchain_timestamp_version_1", |mut caller: HostCaller| {
			Ok(host(&mut caller)?.offchain_timestamp())
		}),
	)?;
	define(
		"ext_offchain_sleep_until_version_1",
		linker.func_wrap(
			env,
			"ext_offchain_sleep_until_version_1",
			|mut caller: HostCaller, deadline: u64| {
				host(&mut caller)?.offchain_sleep_until(deadline);
				Ok(())
			},
		),
	)?;
	define(
		"ext_offchain_local_storage_set_version_1",
		linker.func_wrap(
			env,
			"ext_offchain_local_storage_set_version_1",
			|mut caller: HostCaller, _kind: u32, key: u64, value: u64| {
				let key = read_packed(&mut caller, key)?;
				let value = read_packed(&mut caller, value)?;
				host(&mut caller)?.offchain_local_storage_set(&key, &value);
				Ok(())
			},
		),
	)?;
	define(
		"ext_offchain_local_storage_get_version_1",
		linker.func_wrap(
			env,
			"ext_offchain_local_storage_get_version_1",
			|mut caller: HostCaller, _kind: u32, key: u64| {
				let key = read_packed(&mut caller, key)?;
				let value = host(&mut caller)?.offchain_local_storage_get(&key);
				write_bytes(&mut caller, &value.encode())
			},
		),
	)?;
	define(
		"ext_offchain_local_storage_compare_and_set_version_1",
		linker.func_wrap(
			env,
			"ext_offchain_local_storage_compare_and_set_version_1",
			|mut caller: HostCaller, _kind: u32, key: u64, old: u64, new: u64| {
				let key = read_packed(&mut caller, key)?;
				let old = read_packed(&mut caller, old)?;
				let old = Option::<Vec<u8>>::decode(&mut &old[..])?;
				let new = read_packed(&mut caller, new)?;
				Ok(host(&mut caller)?.offchain_local_storage_compare_and_set(&key, old, &new) as u32)
			},
		),
	)?;
	define(
		"ext_offchain_submit_transaction_version_1",
		linker.func_wrap(
			env,
			"ext_offchain_submit_transaction_version_1",
			|mut caller: HostCaller, extrinsic: u64| {
				let extrinsic = read_packed(&mut caller, extrinsic)?;
				let accepted = host(&mut caller)?.offchain_submit_transaction(extrinsic);
				let result: Result<(), ()> = if accepted { Ok(()) } else { Err(()) };
				write_bytes(&mut caller, &result.encode())
			},
		),
	)?;

	// ---- misc / logging / allocator ----
	define(
		"ext_misc_print_utf8_version_1",
		linker.func_wrap(env, "ext_misc_print_utf8_version_1", |mut caller: HostCaller, data: u64| {
			let data = read_packed(&mut caller, data)?;
			host(&mut caller)?.misc_print_utf8(&data);
			Ok(())
		}),
	)?;
	define(
		"ext_misc_print_hex_version_1",
		linker.func_wrap(env, "ext_misc_print_hex_version_1", |mut caller: HostCaller, data: u64| {
			let data = read_packed(&mut caller, data)?;
			host(&mut caller)?.misc_print_hex(&data);
			Ok(())
		}),
	)?;
	define(
		"ext_misc_print_num_version_1",
		linker.func_wrap(env, "ext_misc_print_num_version_1", |mut caller: HostCaller, value: u64| {
			host(&mut caller)?.misc_print_num(value);
			Ok(())
		}),
	)?;
	define(
		"ext_misc_runtime_version_version_1",
		linker.func_wrap(
			env,
			"ext_misc_runtime_version_version_1",
			|mut caller: HostCaller, code: u64| {
				let code = read_packed(&mut caller, code)?;
				let version = embedded_runtime_version(&code);
				write_bytes(&mut caller, &version.encode())
			},
		),
	)?;
	define(
		"ext_logging_log_version_1",
		linker.func_wrap(
			env,
			"ext_logging_log_version_1",
			|mut caller: HostCaller, level: u32, target: u64, message: u64| {
				let target = read_packed(&mut caller, target)?;
				let message = read_packed(&mut caller, message)?;
				host(&mut caller)?.logging_log(level, &target, &message);
				Ok(())
			},
		),
	)?;
	define(
		"ext_allocator_malloc_version_1",
		linker.func_wrap(env, "ext_allocator_malloc_version_1", |mut caller: HostCaller, size: u32| {
			guest_alloc(&mut caller, size)
		}),
	)?;
	define(
		"ext_allocator_free_version_1",
		linker.func_wrap(env, "ext_allocator_free_version_1", |mut caller: HostCaller, ptr: u32| {
			let memory = memory_of(&caller)?;
			let (data, state) = memory.data_and_store_mut(&mut caller);
			state.allocator.deallocate(&mut (&mut *data), ptr)?;
			Ok(())
		}),
	)?;

	Ok(())
}

/// Run `Core_version` of a foreign runtime blob, for
/// `ext_misc_runtime_version`. Failures simply yield `None`.
fn embedded_runtime_version(code: &[u8]) -> Option<Vec<u8>> {
	use mp_core::keystore::MemoryKeystore;
	use mp_state_machine::TrieState;
	use std::sync::Arc;

	let runtime = WasmRuntime::new(code).ok()?;
	let context = HostContext::new(TrieState::default(), Arc::new(MemoryKeystore::new()));
	let (result, _) = runtime.call(context, "Core_version", &[]);
	result.ok()
}
