diesel::table! {
    db_environment_tests (commit_id, env_name) {
        #[sql_name = "CommitID"]
        commit_id -> Text,
        #[sql_name = "EnvName"]
        env_name -> Text,
        #[sql_name = "ToolTime"]
        tool_time -> Text,
        #[sql_name = "TestTime"]
        test_time -> Text,
        #[sql_name = "NumberOfFail"]
        number_of_fail -> Integer,
        #[sql_name = "NumberOfPass"]
        number_of_pass -> Integer,
        #[sql_name = "NumberOfSkip"]
        number_of_skip -> Integer,
        #[sql_name = "TotalDuration"]
        total_duration -> Double,
        #[sql_name = "ToolVersion"]
        tool_version -> Text,
    }
}

diesel::table! {
    db_test_cases (commit_id, env_name, test_name) {
        #[sql_name = "PR"]
        pr -> Text,
        #[sql_name = "CommitId"]
        commit_id -> Text,
        #[sql_name = "TestName"]
        test_name -> Text,
        #[sql_name = "Result"]
        result -> Text,
        #[sql_name = "Duration"]
        duration -> Double,
        #[sql_name = "EnvName"]
        env_name -> Text,
        #[sql_name = "TestOrder"]
        test_order -> Integer,
        #[sql_name = "TestTime"]
        test_time -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(db_environment_tests, db_test_cases,);
