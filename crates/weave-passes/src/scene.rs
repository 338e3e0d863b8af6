//! The procedural scene the ray-traced passes render.
//!
//! Two spheres (one diffuse, one emissive) over a checkered ground plane,
//! lit by a sun and a sky gradient. The scene is built once per process on
//! first use by a pass type's load hook and then shared read-only.

use std::sync::OnceLock;

use crate::math::Vec3;

const EPSILON: f32 = 1e-3;
pub const FAR_PLANE: f32 = 100.0;

/// Which faces primary rays ignore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub diffuse: Vec3,
    pub opacity: f32,
    pub specular: Vec3,
    pub roughness: f32,
    pub emissive: Vec3,
    pub ior: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub t: f32,
    pub position: Vec3,
    pub normal: Vec3,
    pub face_normal: Vec3,
    pub tangent: Vec3,
    /// 1-based instance id; 0 is reserved for "no hit".
    pub instance: u32,
    pub material: Material,
}

struct Sphere {
    center: Vec3,
    radius: f32,
    material: Material,
}

pub struct Camera {
    pub position: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
    tan_half_fov: f32,
}

impl Camera {
    fn look_at(position: Vec3, target: Vec3, fov_y_degrees: f32) -> Self {
        let forward = (target - position).normalize();
        let right = Vec3::new(0.0, 1.0, 0.0).cross(forward).normalize();
        let up = forward.cross(right);
        Self {
            position,
            forward,
            right,
            up,
            tan_half_fov: (fov_y_degrees.to_radians() * 0.5).tan(),
        }
    }

    /// Direction through the point `(px, py)` in pixel space (sub-pixel offsets allowed).
    pub fn ray_dir(&self, px: f32, py: f32, width: u32, height: u32) -> Vec3 {
        let aspect = width as f32 / height.max(1) as f32;
        let ndc_x = (px / width.max(1) as f32) * 2.0 - 1.0;
        let ndc_y = 1.0 - (py / height.max(1) as f32) * 2.0;
        (self.forward
            + self.right * (ndc_x * aspect * self.tan_half_fov)
            + self.up * (ndc_y * self.tan_half_fov))
            .normalize()
    }
}

pub struct Scene {
    pub camera: Camera,
    spheres: Vec<Sphere>,
    pub sun_direction: Vec3,
    pub sun_radiance: Vec3,
}

static SCENE: OnceLock<Scene> = OnceLock::new();

/// The shared scene, built on first call.
pub fn shared() -> &'static Scene {
    SCENE.get_or_init(|| {
        tracing::debug!("Building procedural scene");
        Scene::build()
    })
}

impl Scene {
    fn build() -> Self {
        let diffuse = |r, g, b| Material {
            diffuse: Vec3::new(r, g, b),
            opacity: 1.0,
            specular: Vec3::splat(0.04),
            roughness: 0.5,
            emissive: Vec3::ZERO,
            ior: 1.5,
        };
        let mut lamp = diffuse(0.0, 0.0, 0.0);
        lamp.emissive = Vec3::new(6.0, 5.0, 3.5);

        Self {
            camera: Camera::look_at(Vec3::new(0.0, 1.4, -4.5), Vec3::new(0.0, 0.8, 0.0), 45.0),
            spheres: vec![
                Sphere {
                    center: Vec3::new(0.0, 1.0, 0.0),
                    radius: 1.0,
                    material: diffuse(0.75, 0.3, 0.2),
                },
                Sphere {
                    center: Vec3::new(1.8, 0.5, -0.6),
                    radius: 0.5,
                    material: lamp,
                },
            ],
            sun_direction: Vec3::new(0.5, 1.0, -0.4).normalize(),
            sun_radiance: Vec3::new(2.6, 2.4, 2.1),
        }
    }

    /// Closest hit along `origin + t * dir` for `t` in `(EPSILON, FAR_PLANE)`.
    pub fn intersect(&self, origin: Vec3, dir: Vec3, cull: CullMode) -> Option<Hit> {
        let mut best: Option<Hit> = None;

        for (i, sphere) in self.spheres.iter().enumerate() {
            let oc = origin - sphere.center;
            let b = oc.dot(dir);
            let c = oc.dot(oc) - sphere.radius * sphere.radius;
            let disc = b * b - c;
            if disc < 0.0 {
                continue;
            }
            let sq = disc.sqrt();
            for (t, front) in [(-b - sq, true), (-b + sq, false)] {
                let culled = match cull {
                    CullMode::None => false,
                    CullMode::Front => front,
                    CullMode::Back => !front,
                };
                if culled || t <= EPSILON || t >= FAR_PLANE {
                    continue;
                }
                if best.map_or(true, |h| t < h.t) {
                    let position = origin + dir * t;
                    let outward = (position - sphere.center) * (1.0 / sphere.radius);
                    let normal = if front { outward } else { -outward };
                    best = Some(Hit {
                        t,
                        position,
                        normal,
                        face_normal: normal,
                        tangent: Vec3::new(0.0, 1.0, 0.0).cross(normal).normalize(),
                        instance: i as u32 + 1,
                        material: sphere.material,
                    });
                }
                break;
            }
        }

        // Ground plane y = 0, seen from above only.
        if dir.y < 0.0 && cull != CullMode::Front {
            let t = -origin.y / dir.y;
            if t > EPSILON && t < FAR_PLANE && best.map_or(true, |h| t < h.t) {
                let position = origin + dir * t;
                let checker = ((position.x.floor() + position.z.floor()) as i64).rem_euclid(2) == 0;
                let shade = if checker { 0.7 } else { 0.25 };
                let normal = Vec3::new(0.0, 1.0, 0.0);
                best = Some(Hit {
                    t,
                    position,
                    normal,
                    face_normal: normal,
                    tangent: Vec3::new(1.0, 0.0, 0.0),
                    instance: self.spheres.len() as u32 + 1,
                    material: Material {
                        diffuse: Vec3::splat(shade),
                        opacity: 1.0,
                        specular: Vec3::splat(0.04),
                        roughness: 0.8,
                        emissive: Vec3::ZERO,
                        ior: 1.5,
                    },
                });
            }
        }
        best
    }

    /// Whether anything blocks the ray before the far plane.
    pub fn occluded(&self, origin: Vec3, dir: Vec3) -> bool {
        self.intersect(origin, dir, CullMode::None).is_some()
    }

    /// Radiance arriving from the sky along `dir`.
    pub fn sky(&self, dir: Vec3) -> Vec3 {
        let t = (dir.y * 0.5 + 0.5).clamp(0.0, 1.0);
        Vec3::new(1.0, 1.0, 1.0) * (1.0 - t) + Vec3::new(0.45, 0.65, 1.0) * t
    }
}
