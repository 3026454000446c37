// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod mocks;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}
