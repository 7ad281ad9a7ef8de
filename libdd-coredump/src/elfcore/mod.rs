// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod importer;
pub mod note;
pub mod phdr;
pub mod vma;
