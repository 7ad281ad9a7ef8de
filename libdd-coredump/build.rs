// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

fn main() {
    // The pthread harvester drives libthread_db, which in turn resolves its
    // ps_* callbacks against our exported symbols at runtime.
    println!("cargo:rustc-link-lib=dylib=thread_db");
    println!("cargo:rustc-link-arg-bins=-Wl,--export-dynamic");
    println!("cargo:rustc-link-arg-tests=-Wl,--export-dynamic");
}
