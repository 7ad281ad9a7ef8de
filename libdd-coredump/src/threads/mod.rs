// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod pthread;
pub mod robust;
pub mod stacks;
pub mod thread_db;
