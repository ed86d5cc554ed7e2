//! Headless cube demo
//!
//! Builds a small scene (a spinning cube, two lights, a camera) against the
//! recording backend and runs it for a fixed number of frames, swapping the
//! material halfway through to show draw calls rebuilding incrementally.

use std::f32::consts::FRAC_PI_4;
use std::path::Path;

use lumen_engine::prelude::*;

const FRAMES: u32 = 120;

fn phong_effect() -> Effect {
    let effect = Effect::new("phong");

    let lit = Pass::new("lit", ProgramTemplate::new("phong", "phong.vert", "phong.frag"))
        .with_attribute(AttributeBinding::new("aPosition", "geometry.position"))
        .with_attribute(AttributeBinding::new("aNormal", "geometry.normal"))
        .with_uniform(UniformBinding::new("uModel", "transform.modelToWorldMatrix"))
        .with_uniform(
            UniformBinding::new("uView", "camera.viewMatrix").from(BindingSource::Renderer),
        )
        .with_uniform(
            UniformBinding::new("uProjection", "camera.projectionMatrix")
                .from(BindingSource::Renderer),
        )
        .with_uniform(UniformBinding::new(
            "uDiffuse",
            "material[${materialId}].diffuseColor",
        ))
        .with_uniform(
            UniformBinding::new("uSumAmbients", "lights.sumAmbients").from(BindingSource::Root),
        )
        .with_macro(MacroBinding::defined(
            "HAS_SHININESS",
            "material[${materialId}].shininess",
        ))
        .with_macro(MacroBinding::length(
            "NUM_DIRECTIONAL_LIGHTS",
            "directionalLights",
        ));

    let flat = Pass::new("flat", ProgramTemplate::new("flat", "flat.vert", "flat.frag"))
        .with_attribute(AttributeBinding::new("aPosition", "geometry.position"))
        .with_uniform(UniformBinding::new("uModel", "transform.modelToWorldMatrix"))
        .with_uniform(UniformBinding::new(
            "uDiffuse",
            "material[${materialId}].diffuseColor",
        ));

    effect.add_technique(Technique::new("lit", vec![lit]));
    effect.add_technique(Technique::new("flat", vec![flat]));
    effect.set_fallback("lit", "flat");
    effect.set_default("diffuseColor", Vec4::new(0.8, 0.8, 0.8, 1.0));
    effect
}

fn main() {
    env_logger::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.ron".into());
    let config = match EngineConfig::load(Path::new(&config_path)) {
        Ok(config) => config,
        Err(error) => {
            log::error!("could not load '{config_path}': {error}");
            std::process::exit(1);
        }
    };
    log::info!(
        "starting cube demo, {}x{} for {FRAMES} frames",
        config.window.width,
        config.window.height
    );

    // Scene: root carries the renderer, camera, lights, and light manager;
    // the cube hangs under it with its own transform and surface.
    let root = Node::new("root");
    root.add_component(LightManager::new())
        .expect("fresh root has no light manager");
    root.add_component(AmbientLight::new(Vec3::new(1.0, 1.0, 1.0), 0.15))
        .expect("attach ambient light");
    root.add_component(DirectionalLight::new(
        Vec3::new(1.0, 0.95, 0.8),
        0.9,
        Vec3::new(-0.5, -1.0, -0.3),
    ))
    .expect("attach directional light");

    let camera = PerspectiveCamera::new(
        config.fov_degrees.to_radians(),
        config.aspect(),
        config.near,
        config.far,
    );
    camera.look_at(
        Point3::new(2.0, 2.0, 4.0),
        Point3::origin(),
        Vec3::new(0.0, 1.0, 0.0),
    );
    root.add_component(camera).expect("attach camera");

    let cube = Node::new("cube");
    root.add_child(&cube).expect("link cube under root");

    let spin = Transform::new();
    cube.add_component(spin.clone()).expect("attach transform");

    let material = Material::new("brushed");
    material.set("diffuseColor", Vec4::new(0.2, 0.5, 0.9, 1.0));
    let surface = Surface::new(Geometry::cube(), material, phong_effect(), "lit")
        .expect("effect defines technique 'lit'");
    cube.add_component(surface.clone()).expect("attach surface");

    let backend: SharedBackend = HeadlessBackend::new().into_shared();
    let renderer = Renderer::new(backend);
    let [r, g, b, a] = config.clear_color;
    renderer.set_clear_color(Vec4::new(r, g, b, a));
    root.add_component(renderer.clone()).expect("attach renderer");
    renderer.set_viewport(config.window.width, config.window.height);

    let mut timer = Timer::new();
    let mut angle = 0.0f32;
    for frame in 0..FRAMES {
        timer.update();
        angle += timer.delta_time() * FRAC_PI_4;
        spin.set_rotation(Quat::from_axis_angle(&Vec3::y_axis(), angle));

        // Halfway through, make the material shiny. The watched macro
        // property appears, so the draw call rebuilds with a new variant;
        // the recolor alone would not rebuild anything.
        if frame == FRAMES / 2 {
            surface.material().set("shininess", 64.0f32);
            surface
                .material()
                .set("diffuseColor", Vec4::new(0.9, 0.4, 0.2, 1.0));
            log::info!("frame {frame}: material now shiny");
        }

        let stats = renderer.enter_frame();
        if frame % 30 == 0 {
            log::info!(
                "frame {frame}: {} draw calls, {} triangles, {} programs",
                stats.draw_calls,
                stats.triangles,
                stats.programs
            );
        }
    }

    let stats = renderer.stats();
    log::info!(
        "done: {} frames, final frame had {} draw calls and {} compiled programs",
        FRAMES,
        stats.draw_calls,
        stats.programs
    );
}
