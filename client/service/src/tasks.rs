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

//! Task lifecycle: every service runs as a named tokio task holding a
//! shutdown receiver; signalling shutdown lets each task finish its
//! current atomic unit before exiting.

use std::future::Future;
use tokio::{sync::watch, task::JoinHandle};

/// Spawns and tracks the node's long-lived tasks.
pub struct TaskManager {
	shutdown_tx: watch::Sender<bool>,
	handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskManager {
	/// A manager with the shutdown signal unset.
	pub fn new() -> Self {
		let (shutdown_tx, _) = watch::channel(false);
		Self { shutdown_tx, handles: Vec::new() }
	}

	/// A receiver tasks select on to learn about shutdown.
	pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
		self.shutdown_tx.subscribe()
	}

	/// Spawn a named long-lived task.
	pub fn spawn(&mut self, name: &'static str, task: impl Future<Output = ()> + Send + 'static) {
		log::debug!(target: crate::LOG_TARGET, "spawning task `{name}`");
		self.handles.push((name, tokio::spawn(task)));
	}

	/// Signal shutdown and wait for every task to finish.
	pub async fn shutdown(self) {
		let _ = self.shutdown_tx.send(true);
		for (name, handle) in self.handles {
			if let Err(error) = handle.await {
				log::warn!(target: crate::LOG_TARGET, "task `{name}` ended abnormally: {error}");
			}
		}
		log::info!(target: crate::LOG_TARGET, "all tasks stopped");
	}
}

impl Default for TaskManager {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn tasks_observe_shutdown() {
		let mut manager = TaskManager::new();
		let mut receiver = manager.shutdown_receiver();
		let (done_tx, done_rx) = tokio::sync::oneshot::channel();
		manager.spawn("waiter", async move {
			let _ = receiver.changed().await;
			let _ = done_tx.send(());
		});
		manager.shutdown().await;
		done_rx.await.expect("the task saw the signal and finished");
	}
}
