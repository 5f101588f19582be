// Copyright 2019-2022 Clemens Lutz
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();

    let fatbin_path = format!("{}/ssb_ops.fatbin", out_dir);
    let cuda_files = vec!["cuda/selection.cu", "cuda/hash_build.cu", "cuda/hash_probe.cu", "cuda/group_by.cu", "cuda/gather.cu"];

    for f in &cuda_files {
        println!("cargo:rerun-if-changed={}", f);
    }

    let nvcc_build_args = vec!["--device-c", "-std=c++14", "--output-directory", &out_dir];
    let nvcc_link_args = vec!["--device-link", "-fatbin", "--output-file", &fatbin_path];

    // See: http://arnon.dk/matching-sm-architectures-arch-and-gencode-for-various-nvidia-cards/
    let gpu_archs = vec![
        "-gencode",
        "arch=compute_61,code=sm_61", // GTX 1080
        "-gencode",
        "arch=compute_70,code=sm_70", // Tesla V100
        "-gencode",
        "arch=compute_75,code=sm_75", // Turing
        "-gencode",
        "arch=compute_80,code=sm_80", // Ampere
    ];

    let output = Command::new("nvcc")
        .args(cuda_files.as_slice())
        .args(nvcc_build_args.as_slice())
        .args(gpu_archs.as_slice())
        .output()
        .expect("Couldn't execute nvcc; is the CUDA toolkit installed and on PATH?");

    if !output.status.success() {
        eprintln!("status: {}", output.status);
        eprintln!("stdout: {}", String::from_utf8_lossy(&output.stdout));
        eprintln!("stderr: {}", String::from_utf8_lossy(&output.stderr));
        panic!("nvcc device-compile failed");
    }

    let cuda_object_files: Vec<_> = cuda_files
        .iter()
        .map(|f| {
            let p = Path::new(f);
            let mut obj = PathBuf::new();
            obj.push(&out_dir);
            obj.push(p.file_stem().unwrap());
            obj.set_extension("o");
            obj
        })
        .collect();

    let output = Command::new("nvcc")
        .args(cuda_object_files.as_slice())
        .args(nvcc_link_args.as_slice())
        .args(gpu_archs.as_slice())
        .output()
        .expect("Couldn't execute nvcc");

    if !output.status.success() {
        eprintln!("status: {}", output.status);
        eprintln!("stdout: {}", String::from_utf8_lossy(&output.stdout));
        eprintln!("stderr: {}", String::from_utf8_lossy(&output.stderr));
        panic!("nvcc device-link failed");
    }

    println!("cargo:rustc-env=SSB_OPS_FATBIN_PATH={}", fatbin_path);
    println!("cargo:rustc-link-search=native=/opt/cuda/lib64");
    println!("cargo:rustc-link-search=native=/usr/local/cuda/lib64");
    println!("cargo:rustc-link-lib=cudart");
}
