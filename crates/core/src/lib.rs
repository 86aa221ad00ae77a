pub mod shared {
    pub mod asset_resolver;
    pub mod config;
    pub mod constants;
    pub mod error;
    pub mod frame;
    pub mod size;
}

pub mod geometry {
    pub mod domain {
        pub mod bounding_box;
        pub mod cover_transform;
        pub mod point;
    }
}

pub mod detection {
    pub mod domain {
        pub mod detection_processor;
        pub mod landmark_detector;
        pub mod result_handler;
        pub mod topology;
    }
    pub mod infrastructure;
}

pub mod status {
    pub mod domain {
        pub mod pipeline_status;
    }
}

pub mod overlay {
    pub mod domain {
        pub mod overlay_renderer;
    }
    pub mod infrastructure;
}

pub mod capture {
    pub mod batch_capture;
    pub mod domain {
        pub mod camera;
        pub mod capture_record;
        pub mod frame_encoder;
    }
    pub mod infrastructure;
}

pub mod display {
    pub mod domain {
        pub mod display_host;
        pub mod listener_guard;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod capture_context;
    pub mod face_capture_session;
    pub mod frame_feeder;
    pub mod media_surfaces;
    pub mod session_error;
    pub mod session_event;
    pub mod session_logger;
}
