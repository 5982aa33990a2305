//! Command-line front door for the photon-mapping core: builds a small
//! built-in demo scene (scene description is an external collaborator's
//! concern, not this crate's — see lib.rs), renders it with either the
//! direct-lighting integrator or the full photon-map integrator, and
//! writes the result out as an HDR image. Generalized from the teacher's
//! own `bin/render.rs` and `bin/testrender.rs`.

use std::error::Error;
use std::fs::File;
use std::sync::Arc;

use cgmath::vec3;
use clap::{App, Arg};

use photon_gi::bvh::BVH;
use photon_gi::camera::PerspectiveCamera;
use photon_gi::config::PhotonMapperConfig;
use photon_gi::film::Film;
use photon_gi::filter::BoxFilter;
use photon_gi::integrator::direct_lighting::{DirectLightingIntegrator, LightStrategy};
use photon_gi::integrator::photon_map::PhotonMapIntegrator;
use photon_gi::integrator::{IntegratorRadiance, SamplerIntegrator};
use photon_gi::light::point::PointLight;
use photon_gi::light::Light;
use photon_gi::material::matte::MatteMaterial;
use photon_gi::primitive::{GeometricPrimitive, Primitive};
use photon_gi::sampler::random::RandomSampler;
use photon_gi::scene::Scene;
use photon_gi::shapes::sphere::Sphere;
use photon_gi::spectrum::Spectrum;
use photon_gi::{Bounds2f, Point2f, Point2i, Point3f, Transform};

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("photon-gi-render")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Renders the crate's built-in demo scene with the photon-mapping core")
        .arg(Arg::with_name("output").long("output").short("o").takes_value(true).default_value("render.hdr"))
        .arg(Arg::with_name("width").long("width").takes_value(true).default_value("400"))
        .arg(Arg::with_name("height").long("height").takes_value(true).default_value("300"))
        .arg(Arg::with_name("spp").long("spp").takes_value(true).default_value("16"))
        .arg(Arg::with_name("threads").long("threads").takes_value(true))
        .arg(Arg::with_name("config").long("config").takes_value(true).help("TOML file with PhotonMapperConfig overrides"))
        .arg(Arg::with_name("photon-map").long("photon-map").help("Use the photon-map integrator instead of direct lighting only"))
        .get_matches();

    let width: i32 = matches.value_of("width").unwrap().parse()?;
    let height: i32 = matches.value_of("height").unwrap().parse()?;
    let spp: u64 = matches.value_of("spp").unwrap().parse()?;
    let output = matches.value_of("output").unwrap();

    if let Some(n) = matches.value_of("threads") {
        let n: usize = n.parse()?;
        rayon::ThreadPoolBuilder::new().num_threads(n).build_global()?;
    }

    let config = match matches.value_of("config") {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let config = PhotonMapperConfig::from_toml_str(&text)?;
            config.validate()?;
            config
        }
        None => PhotonMapperConfig::default(),
    };

    // Demo scene: a diffuse sphere resting on a diffuse ground sphere, lit
    // by a single point light (spec.md §8 scenario 2's setup).
    let sphere_o2w = Transform::translate(vec3(0.0, 0.0, 1.0));
    let sphere_w2o = sphere_o2w.inverse();
    let sphere = Sphere::whole(&sphere_o2w, &sphere_w2o, 1.0);

    let ground_o2w = Transform::translate(vec3(0.0, 0.0, -1000.0));
    let ground_w2o = ground_o2w.inverse();
    let ground = Sphere::whole(&ground_o2w, &ground_w2o, 1000.0);

    let red = Arc::new(MatteMaterial::constant(Spectrum::new(0.7)));
    let grey = Arc::new(MatteMaterial::constant(Spectrum::new(0.4)));

    let sphere_prim = GeometricPrimitive::new(sphere, Some(red), None);
    let ground_prim = GeometricPrimitive::new(ground, Some(grey), None);

    let prims: Vec<&dyn Primitive> = vec![&sphere_prim, &ground_prim];
    let bvh = BVH::build(prims);

    let mut light = PointLight::new(Transform::translate(vec3(3.0, -3.0, 5.0)), Spectrum::new(40.0));
    let lights: Vec<&mut dyn Light> = vec![&mut light];
    let scene = Scene::new(bvh, lights);

    let resolution = Point2i::new(width, height);
    let camera_to_world = Transform::camera_look_at(
        Point3f::new(0.0, -6.0, 3.0),
        Point3f::new(0.0, 0.0, 0.5),
        vec3(0.0, 0.0, 1.0),
    );
    let screen_window = Bounds2f::with_bounds(Point2f::new(-1.0, -1.0), Point2f::new(1.0, 1.0));
    let camera = PerspectiveCamera::new(
        camera_to_world,
        resolution,
        screen_window,
        (0.0, 1.0),
        0.0,
        1.0e6,
        50.0,
    );

    let crop_window = Bounds2f::with_bounds(Point2f::new(0.0, 0.0), Point2f::new(1.0, 1.0));
    let film = Film::new(resolution, crop_window, BoxFilter::default(), 1.0);

    let sampler = RandomSampler::new_with_seed(spp, 0);

    if matches.is_present("photon-map") {
        let radiance = PhotonMapIntegrator::new(config, 5);
        render_with(radiance, camera, &scene, &film, sampler);
    } else {
        let radiance = DirectLightingIntegrator::new(LightStrategy::UniformSampleOne, 5);
        render_with(radiance, camera, &scene, &film, sampler);
    }

    let img = film.into_image_buffer();
    let file = File::create(output)?;
    let encoder = image::hdr::HDREncoder::new(file);
    let pixels: Vec<_> = img.pixels().map(|p| *p).collect();
    encoder.encode(pixels.as_slice(), img.width() as usize, img.height() as usize)?;

    Ok(())
}

fn render_with<R: IntegratorRadiance>(
    radiance: R,
    camera: PerspectiveCamera,
    scene: &Scene,
    film: &Film<BoxFilter>,
    sampler: RandomSampler,
) {
    let mut integrator = SamplerIntegrator { camera: Box::new(camera), radiance };
    integrator.render_parallel(scene, film, sampler);
}
