pub mod haar_cascade;
pub mod haar_face_detector;
pub mod integral_image;
