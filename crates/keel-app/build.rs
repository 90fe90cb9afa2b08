// SPDX-License-Identifier: CEPL-1.0
fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo::rustc-check-cfg=cfg(embedded_shaders)");
    #[cfg(feature = "compile-shaders")]
    shaders::compile()?;
    Ok(())
}

#[cfg(feature = "compile-shaders")]
mod shaders {
    use std::{env, fs, path::PathBuf};

    const SOURCES: [(&str, shaderc::ShaderKind); 2] = [
        ("quad.vert", shaderc::ShaderKind::Vertex),
        ("quad.frag", shaderc::ShaderKind::Fragment),
    ];

    pub fn compile() -> Result<(), Box<dyn std::error::Error>> {
        let out = PathBuf::from(env::var("OUT_DIR")?);
        let dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?).join("shaders");

        let compiler = shaderc::Compiler::new()?;
        let mut opts = shaderc::CompileOptions::new()?;
        opts.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_0 as u32,
        );
        opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

        for (name, kind) in SOURCES {
            let path = dir.join(name);
            println!("cargo::rerun-if-changed={}", path.display());
            let source = fs::read_to_string(&path)?;
            let spv = compiler.compile_into_spirv(&source, kind, name, "main", Some(&opts))?;
            fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8())?;
        }

        println!("cargo::rustc-cfg=embedded_shaders");
        Ok(())
    }
}
